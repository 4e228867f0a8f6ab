//! Find query descriptor.
//!
//! Options are validated and flattened into a find-options document at
//! construction. Legacy `modifiers` (`$orderby`, `$maxTimeMS`, ...) fill in any
//! option the caller did not set at the top level.

use bson::{Bson, Document, RawDocument, RawDocumentBuf};
use tracing::trace;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::options::{validate_max_await_time_ms, ReadConcern};
use crate::value::{Map, Value};

/// Legacy modifier name -> find option name.
const MODIFIERS: &[(&str, &str)] = &[
    ("$comment", "comment"),
    ("$hint", "hint"),
    ("$max", "max"),
    ("$maxTimeMS", "maxTimeMS"),
    ("$min", "min"),
    ("$orderby", "sort"),
    ("$returnKey", "returnKey"),
    ("$showDiskLoc", "showRecordId"),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub allow_disk_use: Option<bool>,
    pub allow_partial_results: Option<bool>,
    pub await_data: Option<bool>,
    pub batch_size: Option<i64>,
    pub collation: Option<Value>,
    pub comment: Option<Value>,
    pub exhaust: Option<bool>,
    pub hint: Option<Value>,
    pub let_vars: Option<Value>,
    /// A negative limit requests a single batch of `|limit|` documents.
    pub limit: Option<i64>,
    pub max: Option<Value>,
    pub max_await_time_ms: Option<i64>,
    pub max_time_ms: Option<i64>,
    pub min: Option<Value>,
    pub no_cursor_timeout: Option<bool>,
    pub projection: Option<Value>,
    pub read_concern: Option<ReadConcern>,
    pub return_key: Option<bool>,
    pub show_record_id: Option<bool>,
    pub single_batch: Option<bool>,
    pub skip: Option<i64>,
    pub sort: Option<Value>,
    pub tailable: Option<bool>,
    pub modifiers: Option<Value>,
}

/// An encoded filter plus its find options.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    filter: RawDocumentBuf,
    opts: RawDocumentBuf,
    read_concern: Option<ReadConcern>,
    max_await_time_ms: u32,
}

impl Query {
    /// Builds a query using the default depth bound.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for out-of-range numeric options, a non-mapping
    /// `modifiers` value, or a negative limit combined with `singleBatch: false`;
    /// `Decode` when the filter or an option value cannot be encoded.
    pub fn new(filter: &Value, options: &QueryOptions) -> Result<Self> {
        Self::with_codec(&Codec::default(), filter, options)
    }

    /// # Errors
    ///
    /// See [`Query::new`].
    pub fn with_codec(codec: &Codec, filter: &Value, options: &QueryOptions) -> Result<Self> {
        let max_await_time_ms = validate_max_await_time_ms(options.max_await_time_ms)?;
        let opts = OptsBuilder::new(codec, options)?.build()?;
        let filter = codec.encode(filter)?;
        Ok(Self {
            filter,
            opts: RawDocumentBuf::from_document(&opts)?,
            read_concern: options.read_concern.clone(),
            max_await_time_ms,
        })
    }

    #[must_use]
    pub fn filter(&self) -> &RawDocument {
        &self.filter
    }

    /// The flattened find options (`sort`, `limit`, `singleBatch`, ...).
    #[must_use]
    pub fn opts(&self) -> &RawDocument {
        &self.opts
    }

    #[must_use]
    pub fn read_concern(&self) -> Option<&ReadConcern> {
        self.read_concern.as_ref()
    }

    #[must_use]
    pub fn max_await_time_ms(&self) -> u32 {
        self.max_await_time_ms
    }

    /// `batchSize` from the find options, or 0.
    #[must_use]
    pub fn batch_size(&self) -> u32 {
        match self.opts.get("batchSize") {
            Ok(Some(bson::raw::RawBsonRef::Int64(n))) => u32::try_from(n).unwrap_or(0),
            _ => 0,
        }
    }

    /// Debug view with the decoded `filter`, `options` and `readConcern`.
    ///
    /// # Errors
    ///
    /// Fails when a stored document cannot be decoded.
    pub fn to_document(&self, codec: &Codec) -> Result<Value> {
        let mut out = Map::new();
        out.insert("filter", codec.decode_document(&self.filter)?);
        out.insert("options", codec.decode_document(&self.opts)?);
        let read_concern = match &self.read_concern {
            Some(rc) => {
                let raw = RawDocumentBuf::from_document(&rc.to_document())?;
                codec.decode_document(&raw)?
            }
            None => Value::Null,
        };
        out.insert("readConcern", read_concern);
        Ok(Value::Map(out))
    }
}

struct OptsBuilder<'a> {
    codec: &'a Codec,
    options: &'a QueryOptions,
    modifiers: Option<&'a Map>,
    opts: Document,
}

impl<'a> OptsBuilder<'a> {
    fn new(codec: &'a Codec, options: &'a QueryOptions) -> Result<Self> {
        let modifiers = match &options.modifiers {
            None => None,
            Some(Value::Map(map)) => Some(map),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "Expected \"modifiers\" option to be a mapping, {} given",
                    other.type_name()
                )));
            }
        };
        Ok(Self {
            codec,
            options,
            modifiers,
            opts: Document::new(),
        })
    }

    fn build(mut self) -> Result<Document> {
        let o = self.options;

        self.flag("allowDiskUse", o.allow_disk_use);
        self.flag("allowPartialResults", o.allow_partial_results);
        self.flag("awaitData", o.await_data);
        if let Some(batch_size) = o.batch_size {
            self.opts.insert("batchSize", non_negative("batchSize", batch_size)?);
        }
        self.value("collation", o.collation.as_ref())?;
        self.value("comment", o.comment.as_ref())?;
        self.flag("exhaust", o.exhaust);
        self.value("hint", o.hint.as_ref())?;
        self.value("let", o.let_vars.as_ref())?;
        self.limit_and_single_batch()?;
        self.value("max", o.max.as_ref())?;
        if let Some(ms) = o.max_time_ms {
            self.opts.insert("maxTimeMS", non_negative("maxTimeMS", ms)?);
        }
        self.value("min", o.min.as_ref())?;
        self.flag("noCursorTimeout", o.no_cursor_timeout);
        self.value("projection", o.projection.as_ref())?;
        self.flag("returnKey", o.return_key);
        self.flag("showRecordId", o.show_record_id);
        if let Some(skip) = o.skip {
            self.opts.insert("skip", non_negative("skip", skip)?);
        }
        self.value("sort", o.sort.as_ref())?;
        self.flag("tailable", o.tailable);

        self.apply_modifiers()?;
        Ok(self.opts)
    }

    fn flag(&mut self, key: &str, value: Option<bool>) {
        if let Some(b) = value {
            self.opts.insert(key, b);
        }
    }

    fn value(&mut self, key: &str, value: Option<&Value>) -> Result<()> {
        if let Some(v) = value {
            self.opts.insert(key, self.codec.encode_bson(v)?);
        }
        Ok(())
    }

    fn limit_and_single_batch(&mut self) -> Result<()> {
        let o = self.options;
        match o.limit {
            Some(limit) if limit < 0 => {
                if o.single_batch == Some(false) {
                    return Err(Error::invalid_argument(
                        "Negative \"limit\" option conflicts with false \"singleBatch\" option",
                    ));
                }
                self.opts.insert("limit", limit.saturating_neg());
                self.opts.insert("singleBatch", true);
            }
            Some(limit) => {
                self.opts.insert("limit", limit);
                self.flag("singleBatch", o.single_batch);
            }
            None => self.flag("singleBatch", o.single_batch),
        }
        Ok(())
    }

    /// Copies each legacy modifier whose option is still unset.
    fn apply_modifiers(&mut self) -> Result<()> {
        let Some(modifiers) = self.modifiers else {
            return Ok(());
        };
        for (modifier, option) in MODIFIERS {
            let Some(value) = modifiers.get(modifier) else {
                continue;
            };
            if self.opts.contains_key(*option) {
                trace!(modifier, option, "top-level option overrides modifier");
                continue;
            }
            let bson = match (*option, value) {
                ("maxTimeMS", Value::Int(ms)) => Bson::Int64(non_negative("maxTimeMS", *ms)?),
                _ => self.codec.encode_bson(value)?,
            };
            self.opts.insert(*option, bson);
        }
        Ok(())
    }
}

fn non_negative(name: &str, value: i64) -> Result<i64> {
    if value < 0 {
        return Err(Error::invalid_argument(format!(
            "Expected \"{name}\" option to be >= 0, {value} given"
        )));
    }
    Ok(value)
}
