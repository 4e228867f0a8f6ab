//! Typed execution options and the option normalizer.
//!
//! Callers hand an execute call either a full [`ExecuteOptions`] mapping or, for
//! the entry points that still accept it, a bare legacy value (a read
//! preference or write concern). [`normalize`] reconciles both shapes into the
//! single option set passed to the wire layer.
//!
//! All structures use `#[serde(rename_all = "camelCase")]` so a binding layer
//! can deserialize them straight from a document. Keys this layer does not
//! recognize are kept in [`ExecuteOptions::extra`] and passed through untouched.

use std::borrow::Cow;
use std::fmt;

use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Read preference
// ---------------------------------------------------------------------------

/// Which members of a replica set a read may be routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadMode {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPreference {
    pub mode: ReadMode,
    #[serde(rename = "tags", skip_serializing_if = "Vec::is_empty", default)]
    pub tag_sets: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_staleness_seconds: Option<i64>,
}

impl ReadPreference {
    #[must_use]
    pub fn new(mode: ReadMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tag_sets(mut self, tag_sets: Vec<Document>) -> Self {
        self.tag_sets = tag_sets;
        self
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut out = doc! { "mode": self.mode.as_str() };
        if !self.tag_sets.is_empty() {
            let tags: Vec<Bson> = self.tag_sets.iter().cloned().map(Bson::Document).collect();
            out.insert("tags", tags);
        }
        if let Some(seconds) = self.max_staleness_seconds {
            out.insert("maxStalenessSeconds", seconds);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Write and read concern
// ---------------------------------------------------------------------------

/// The `w` field of a write concern: a node count or a tag such as `"majority"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Acknowledgment {
    Nodes(u32),
    Tag(String),
}

impl From<&Acknowledgment> for Bson {
    fn from(ack: &Acknowledgment) -> Self {
        match ack {
            Acknowledgment::Nodes(n) => Bson::Int64(i64::from(*n)),
            Acknowledgment::Tag(tag) => Bson::String(tag.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteConcern {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub w: Option<Acknowledgment>,
    #[serde(rename = "j", skip_serializing_if = "Option::is_none", default)]
    pub journal: Option<bool>,
    #[serde(rename = "wtimeout", skip_serializing_if = "Option::is_none", default)]
    pub w_timeout_ms: Option<i64>,
}

impl WriteConcern {
    #[must_use]
    pub fn majority() -> Self {
        Self {
            w: Some(Acknowledgment::Tag("majority".to_string())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn nodes(n: u32) -> Self {
        Self {
            w: Some(Acknowledgment::Nodes(n)),
            ..Self::default()
        }
    }

    /// `w: 0` without journaling is fire-and-forget.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.w != Some(Acknowledgment::Nodes(0)) || self.journal == Some(true)
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        if let Some(w) = &self.w {
            out.insert("w", Bson::from(w));
        }
        if let Some(journal) = self.journal {
            out.insert("j", journal);
        }
        if let Some(timeout) = self.w_timeout_ms {
            out.insert("wtimeout", timeout);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadConcern {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
}

impl ReadConcern {
    #[must_use]
    pub fn level(level: impl Into<String>) -> Self {
        Self {
            level: Some(level.into()),
        }
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        match &self.level {
            Some(level) => doc! { "level": level.as_str() },
            None => Document::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Execute options
// ---------------------------------------------------------------------------

/// Option set handed to the wire layer for one execute call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOptions {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub read_preference: Option<ReadPreference>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub write_concern: Option<WriteConcern>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub read_concern: Option<ReadConcern>,
    /// Unrecognized keys, forwarded verbatim.
    #[serde(flatten)]
    pub extra: Document,
}

impl ExecuteOptions {
    #[must_use]
    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = Some(read_preference);
        self
    }

    #[must_use]
    pub fn with_write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = Some(write_concern);
        self
    }

    #[must_use]
    pub fn with_read_concern(mut self, read_concern: ReadConcern) -> Self {
        self.read_concern = Some(read_concern);
        self
    }
}

/// What a caller passed as the options argument of an execute call.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionsArg {
    Options(ExecuteOptions),
    /// Legacy bare read preference.
    ReadPreference(ReadPreference),
    /// Legacy bare write concern.
    WriteConcern(WriteConcern),
}

impl OptionsArg {
    fn kind(&self) -> &'static str {
        match self {
            Self::Options(_) => "options",
            Self::ReadPreference(_) => "read preference",
            Self::WriteConcern(_) => "write concern",
        }
    }
}

impl From<ExecuteOptions> for OptionsArg {
    fn from(options: ExecuteOptions) -> Self {
        Self::Options(options)
    }
}

impl From<ReadPreference> for OptionsArg {
    fn from(read_preference: ReadPreference) -> Self {
        Self::ReadPreference(read_preference)
    }
}

impl From<WriteConcern> for OptionsArg {
    fn from(write_concern: WriteConcern) -> Self {
        Self::WriteConcern(write_concern)
    }
}

/// The bare legacy value an entry point still accepts in place of options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyKey {
    ReadPreference,
    WriteConcern,
}

impl LegacyKey {
    /// Canonical key the legacy value is lifted under.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::ReadPreference => "readPreference",
            Self::WriteConcern => "writeConcern",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::ReadPreference => "read preference",
            Self::WriteConcern => "write concern",
        }
    }
}

/// Reconciles the options argument of an execute call.
///
/// A full options mapping is borrowed as-is. A bare legacy value accepted by
/// `legacy` is lifted into a fresh mapping under its canonical key; that mapping
/// is owned by the returned `Cow` and dropped with it on every exit path.
/// An absent argument yields the default (empty) options.
///
/// # Errors
///
/// Returns `InvalidArgument` when a bare legacy value is passed to an entry
/// point that does not accept that kind of value.
pub fn normalize(
    arg: Option<&OptionsArg>,
    legacy: Option<LegacyKey>,
) -> Result<Cow<'_, ExecuteOptions>> {
    let lifted = match (arg, legacy) {
        (None, _) => return Ok(Cow::Owned(ExecuteOptions::default())),
        (Some(OptionsArg::Options(options)), _) => return Ok(Cow::Borrowed(options)),
        (Some(OptionsArg::ReadPreference(rp)), Some(LegacyKey::ReadPreference)) => {
            ExecuteOptions::default().with_read_preference(rp.clone())
        }
        (Some(OptionsArg::WriteConcern(wc)), Some(LegacyKey::WriteConcern)) => {
            ExecuteOptions::default().with_write_concern(wc.clone())
        }
        (Some(other), Some(key)) => {
            return Err(Error::invalid_argument(format!(
                "Expected options to be a mapping or {}, {} given",
                key.describe(),
                other.kind()
            )));
        }
        (Some(other), None) => {
            return Err(Error::invalid_argument(format!(
                "Expected options to be a mapping, {} given",
                other.kind()
            )));
        }
    };
    if let Some(key) = legacy {
        debug!(key = key.key(), "lifted legacy option into options mapping");
    }
    Ok(Cow::Owned(lifted))
}

/// Validates a caller-supplied `maxAwaitTimeMS`; absent means 0.
///
/// # Errors
///
/// Returns `InvalidArgument` for negative values or values above `u32::MAX`.
pub fn validate_max_await_time_ms(value: Option<i64>) -> Result<u32> {
    let Some(value) = value else {
        return Ok(0);
    };
    if value < 0 {
        return Err(Error::invalid_argument(format!(
            "Expected \"maxAwaitTimeMS\" option to be >= 0, {value} given"
        )));
    }
    u32::try_from(value).map_err(|_| {
        Error::invalid_argument(format!(
            "Expected \"maxAwaitTimeMS\" option to be <= {}, {value} given",
            u32::MAX
        ))
    })
}
