//! Raw database command descriptor.

use bson::{RawDocument, RawDocumentBuf};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::codec::{self, Codec};
use crate::error::{Error, Result};
use crate::options::validate_max_await_time_ms;
use crate::value::{Map, Value};

/// Construction options for [`Command`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Advisory await time for tailable cursors produced by the command.
    #[serde(rename = "maxAwaitTimeMS", skip_serializing_if = "Option::is_none", default)]
    pub max_await_time_ms: Option<i64>,
}

impl CommandOptions {
    #[must_use]
    pub fn max_await_time_ms(value: i64) -> Self {
        Self {
            max_await_time_ms: Some(value),
        }
    }
}

impl TryFrom<&Value> for CommandOptions {
    type Error = Error;

    /// Reads the recognized keys out of a loosely-typed options mapping.
    /// Other keys are ignored.
    fn try_from(value: &Value) -> Result<Self> {
        let Value::Map(map) = value else {
            return Err(Error::invalid_argument(format!(
                "Expected options to be a mapping, {} given",
                value.type_name()
            )));
        };
        let max_await_time_ms = match map.get("maxAwaitTimeMS") {
            None => None,
            Some(Value::Int(n)) => Some(*n),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "Expected \"maxAwaitTimeMS\" option to be an integer, {} given",
                    other.type_name()
                )));
            }
        };
        Ok(Self { max_await_time_ms })
    }
}

/// An encoded command document plus the cursor settings derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    body: RawDocumentBuf,
    batch_size: u32,
    max_await_time_ms: u32,
}

impl Command {
    /// Builds a command from a host document using the default depth bound.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range `maxAwaitTimeMS` (checked before
    /// the body is encoded), `Decode` when the body cannot be encoded.
    pub fn new(body: &Value, options: Option<&CommandOptions>) -> Result<Self> {
        Self::with_codec(&Codec::default(), body, options)
    }

    /// Builds a command with an explicit codec.
    ///
    /// # Errors
    ///
    /// See [`Command::new`].
    pub fn with_codec(codec: &Codec, body: &Value, options: Option<&CommandOptions>) -> Result<Self> {
        let max_await_time_ms =
            validate_max_await_time_ms(options.and_then(|o| o.max_await_time_ms))?;
        let body = codec.encode(body)?;
        Ok(Self::assemble(body, max_await_time_ms))
    }

    /// Builds a command from an already-encoded document.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an out-of-range `maxAwaitTimeMS`.
    pub fn from_raw(body: RawDocumentBuf, options: Option<&CommandOptions>) -> Result<Self> {
        let max_await_time_ms =
            validate_max_await_time_ms(options.and_then(|o| o.max_await_time_ms))?;
        Ok(Self::assemble(body, max_await_time_ms))
    }

    fn assemble(body: RawDocumentBuf, max_await_time_ms: u32) -> Self {
        let batch_size = extract_batch_size(&body);
        Self {
            body,
            batch_size,
            max_await_time_ms,
        }
    }

    #[must_use]
    pub fn body(&self) -> &RawDocument {
        &self.body
    }

    /// `cursor.batchSize` from the body, or 0.
    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    #[must_use]
    pub fn max_await_time_ms(&self) -> u32 {
        self.max_await_time_ms
    }

    /// The command name: the first key of the body.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.body.iter().next().and_then(|entry| entry.ok()).map(|(key, _)| key)
    }

    /// Debug view: the decoded body under `command`.
    ///
    /// # Errors
    ///
    /// Fails when the stored body cannot be decoded.
    pub fn to_document(&self, codec: &Codec) -> Result<Value> {
        let mut out = Map::new();
        out.insert("command", codec.decode_document(&self.body)?);
        Ok(Value::Map(out))
    }
}

/// Cursor batch size requested by a command body.
///
/// Only an int32/int64 in `0..=u32::MAX` at `cursor.batchSize` is adopted. Any
/// other shape, including malformed nested bytes, leaves the default of 0.
fn extract_batch_size(body: &RawDocument) -> u32 {
    let Some(raw) = codec::find_descendant(body, "cursor.batchSize") else {
        return 0;
    };
    match codec::as_integer(raw).and_then(|n| u32::try_from(n).ok()) {
        Some(batch_size) => batch_size,
        None => {
            trace!(element_type = ?raw.element_type(), "ignoring unusable cursor.batchSize");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use proptest::prelude::*;

    use super::*;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().collect())
    }

    fn find_with_batch_size(batch_size: Value) -> Value {
        map(vec![
            ("find", Value::from("c")),
            ("cursor", map(vec![("batchSize", batch_size)])),
        ])
    }

    #[test]
    fn ping_with_max_await_time() {
        let cmd = Command::new(
            &map(vec![("ping", Value::Int(1))]),
            Some(&CommandOptions::max_await_time_ms(500)),
        )
        .unwrap();
        assert_eq!(cmd.max_await_time_ms(), 500);
        assert_eq!(cmd.batch_size(), 0);
        assert_eq!(cmd.name(), Some("ping"));
    }

    #[test]
    fn find_with_cursor_batch_size() {
        let cmd = Command::new(&find_with_batch_size(Value::Int(50)), None).unwrap();
        assert_eq!(cmd.batch_size(), 50);
        assert_eq!(cmd.max_await_time_ms(), 0);
    }

    #[test]
    fn negative_max_await_time_fails() {
        let err = Command::new(
            &map(vec![("ping", Value::Int(1))]),
            Some(&CommandOptions::max_await_time_ms(-1)),
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn validation_runs_before_encoding() {
        // The body is not encodable; the option error must win.
        let err = Command::new(&Value::Int(1), Some(&CommandOptions::max_await_time_ms(-1)))
            .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn unusable_batch_sizes_are_ignored() {
        for value in [
            Value::Int(-1),
            Value::Int(i64::from(u32::MAX) + 1),
            Value::Float(10.0),
            Value::from("10"),
        ] {
            let cmd = Command::new(&find_with_batch_size(value), None).unwrap();
            assert_eq!(cmd.batch_size(), 0);
        }
        let cmd = Command::new(
            &map(vec![("find", Value::from("c")), ("cursor", Value::Int(5))]),
            None,
        )
        .unwrap();
        assert_eq!(cmd.batch_size(), 0);
    }

    #[test]
    fn from_raw_extracts_batch_size() {
        let body = RawDocumentBuf::from_document(&doc! {
            "aggregate": "c", "pipeline": [], "cursor": { "batchSize": 7_i64 },
        })
        .unwrap();
        let cmd = Command::from_raw(body, None).unwrap();
        assert_eq!(cmd.batch_size(), 7);
        assert_eq!(cmd.name(), Some("aggregate"));
    }

    #[test]
    fn options_from_loose_mapping() {
        let options =
            CommandOptions::try_from(&map(vec![("maxAwaitTimeMS", Value::Int(10))])).unwrap();
        assert_eq!(options.max_await_time_ms, Some(10));

        let err = CommandOptions::try_from(&map(vec![("maxAwaitTimeMS", Value::from("10"))]))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(CommandOptions::try_from(&Value::Null).is_err());
    }

    #[test]
    fn debug_view_wraps_body() {
        let body = map(vec![("ping", Value::Int(1))]);
        let cmd = Command::new(&body, None).unwrap();
        let view = cmd.to_document(&Codec::default()).unwrap();
        assert_eq!(view.get("command"), Some(&body));
    }

    proptest! {
        #[test]
        fn max_await_time_in_range_is_stored(n in 0..=i64::from(u32::MAX)) {
            let cmd = Command::new(
                &map(vec![("ping", Value::Int(1))]),
                Some(&CommandOptions::max_await_time_ms(n)),
            ).unwrap();
            prop_assert_eq!(i64::from(cmd.max_await_time_ms()), n);
        }

        #[test]
        fn max_await_time_out_of_range_is_rejected(
            n in prop_oneof![i64::MIN..0, (i64::from(u32::MAX) + 1)..=i64::MAX]
        ) {
            let err = Command::new(
                &map(vec![("ping", Value::Int(1))]),
                Some(&CommandOptions::max_await_time_ms(n)),
            ).unwrap_err();
            prop_assert!(err.is_invalid_argument());
        }

        #[test]
        fn batch_size_adopted_only_in_range(n in any::<i64>()) {
            let cmd = Command::new(&find_with_batch_size(Value::Int(n)), None).unwrap();
            let expected = u32::try_from(n).unwrap_or(0);
            prop_assert_eq!(cmd.batch_size(), expected);
        }
    }
}
