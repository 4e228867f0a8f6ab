//! Depth-bounded conversion between host values and BSON documents.
//!
//! Both directions walk the tree recursively with an explicit depth counter.
//! A document nested deeper than the configured bound fails with
//! [`CodecError::DepthExceeded`] instead of exhausting the stack. The top-level
//! document counts as depth 1.
//!
//! Decoding reads straight from the raw byte representation, so a reply is never
//! materialized as an intermediate `bson::Document` tree.

use bson::raw::RawBsonRef;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document, RawDocument, RawDocumentBuf};

use crate::error::CodecError;
use crate::value::{Map, Value};

/// Nesting bound applied when no explicit limit is configured.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Host value <-> BSON converter with a nesting bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    max_depth: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Codec {
    /// Creates a codec allowing at most `max_depth` nested documents/arrays.
    /// A bound of zero is raised to one so flat documents always work.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn check_depth(&self, depth: usize) -> Result<(), CodecError> {
        if depth > self.max_depth {
            return Err(CodecError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    // -- encoding --

    /// Encodes a map (or array, keyed `"0"`, `"1"`, ...) into an owned BSON document.
    ///
    /// # Errors
    ///
    /// Fails for scalar top-level values, keys containing null bytes, and trees
    /// nested beyond the depth bound.
    pub fn encode(&self, value: &Value) -> Result<RawDocumentBuf, CodecError> {
        let doc = self.encode_document(value)?;
        Ok(RawDocumentBuf::from_document(&doc)?)
    }

    /// Same as [`Codec::encode`] but returns the document tree.
    ///
    /// # Errors
    ///
    /// See [`Codec::encode`].
    pub fn encode_document(&self, value: &Value) -> Result<Document, CodecError> {
        match value {
            Value::Map(map) => self.encode_map(map, 1),
            Value::Array(items) => {
                self.check_depth(1)?;
                let mut doc = Document::new();
                for (idx, item) in items.iter().enumerate() {
                    doc.insert(idx.to_string(), self.encode_value(item, 2)?);
                }
                Ok(doc)
            }
            other => Err(CodecError::NotADocument {
                found: other.type_name(),
            }),
        }
    }

    /// Encodes any value, including scalars, into a `Bson` tree.
    ///
    /// # Errors
    ///
    /// Fails for invalid keys and trees nested beyond the depth bound.
    pub fn encode_bson(&self, value: &Value) -> Result<Bson, CodecError> {
        self.encode_value(value, 1)
    }

    fn encode_map(&self, map: &Map, depth: usize) -> Result<Document, CodecError> {
        self.check_depth(depth)?;
        let mut doc = Document::new();
        for (key, value) in map.iter() {
            if key.contains('\0') {
                return Err(CodecError::InvalidKey {
                    key: key.to_string(),
                });
            }
            doc.insert(key, self.encode_value(value, depth + 1)?);
        }
        Ok(doc)
    }

    fn encode_value(&self, value: &Value, depth: usize) -> Result<Bson, CodecError> {
        let bson = match value {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(n) => match i32::try_from(*n) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(*n),
            },
            Value::Float(f) => Bson::Double(*f),
            Value::String(s) => Bson::String(s.clone()),
            Value::Bytes(bytes) => Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.clone(),
            }),
            Value::Array(items) => {
                self.check_depth(depth)?;
                let encoded = items
                    .iter()
                    .map(|item| self.encode_value(item, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Bson::Array(encoded)
            }
            Value::Map(map) => Bson::Document(self.encode_map(map, depth)?),
            Value::ObjectId(oid) => Bson::ObjectId(*oid),
            Value::DateTime(dt) => Bson::DateTime(*dt),
            Value::Other(bson) => {
                self.check_bson_depth(bson, depth)?;
                bson.clone()
            }
        };
        Ok(bson)
    }

    /// Applies the depth bound to a BSON tree carried through unchanged.
    fn check_bson_depth(&self, bson: &Bson, depth: usize) -> Result<(), CodecError> {
        match bson {
            Bson::Document(doc) => self.check_document_depth(doc, depth),
            Bson::JavaScriptCodeWithScope(code) => self.check_document_depth(&code.scope, depth),
            Bson::Array(items) => {
                self.check_depth(depth)?;
                items
                    .iter()
                    .try_for_each(|item| self.check_bson_depth(item, depth + 1))
            }
            _ => Ok(()),
        }
    }

    fn check_document_depth(&self, doc: &Document, depth: usize) -> Result<(), CodecError> {
        self.check_depth(depth)?;
        doc.values()
            .try_for_each(|value| self.check_bson_depth(value, depth + 1))
    }

    // -- decoding --

    /// Decodes a BSON byte buffer into a host map.
    ///
    /// A document repeating a key keeps the first position and the last value.
    ///
    /// # Errors
    ///
    /// Fails for malformed bytes and documents nested beyond the depth bound.
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let doc = RawDocument::from_bytes(bytes)?;
        self.decode_document(doc)
    }

    /// Decodes an already-validated raw document into a host map.
    ///
    /// # Errors
    ///
    /// See [`Codec::decode`].
    pub fn decode_document(&self, doc: &RawDocument) -> Result<Value, CodecError> {
        self.decode_map(doc, 1).map(Value::Map)
    }

    fn decode_map(&self, doc: &RawDocument, depth: usize) -> Result<Map, CodecError> {
        self.check_depth(depth)?;
        let mut map = Map::new();
        for element in doc {
            let (key, raw) = element?;
            map.insert(key, self.decode_raw(raw, depth + 1)?);
        }
        Ok(map)
    }

    fn decode_raw(&self, raw: RawBsonRef<'_>, depth: usize) -> Result<Value, CodecError> {
        let value = match raw {
            RawBsonRef::Null => Value::Null,
            RawBsonRef::Boolean(b) => Value::Bool(b),
            RawBsonRef::Int32(n) => Value::Int(i64::from(n)),
            RawBsonRef::Int64(n) => Value::Int(n),
            RawBsonRef::Double(f) => Value::Float(f),
            RawBsonRef::String(s) => Value::String(s.to_string()),
            RawBsonRef::Binary(bin) if bin.subtype == BinarySubtype::Generic => {
                Value::Bytes(bin.bytes.to_vec())
            }
            RawBsonRef::ObjectId(oid) => Value::ObjectId(oid),
            RawBsonRef::DateTime(dt) => Value::DateTime(dt),
            RawBsonRef::Document(child) => Value::Map(self.decode_map(child, depth)?),
            RawBsonRef::Array(array) => {
                self.check_depth(depth)?;
                let mut items = Vec::new();
                for item in array {
                    items.push(self.decode_raw(item?, depth + 1)?);
                }
                Value::Array(items)
            }
            RawBsonRef::JavaScriptCodeWithScope(code) => {
                self.decode_map(code.scope, depth)?;
                Value::Other(Bson::try_from(raw.to_raw_bson())?)
            }
            other => Value::Other(Bson::try_from(other.to_raw_bson())?),
        };
        Ok(value)
    }
}

/// Encodes with the default depth bound.
///
/// # Errors
///
/// See [`Codec::encode`].
pub fn encode(value: &Value) -> Result<RawDocumentBuf, CodecError> {
    Codec::default().encode(value)
}

/// Decodes with the default depth bound.
///
/// # Errors
///
/// See [`Codec::decode`].
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    Codec::default().decode(bytes)
}

// ---------------------------------------------------------------------------
// Raw document lookups
// ---------------------------------------------------------------------------

/// Walks a dotted path (`"cursor.batchSize"`) through nested documents.
///
/// Missing keys, non-document intermediates, and malformed bytes all yield
/// `None`.
#[must_use]
pub fn find_descendant<'a>(doc: &'a RawDocument, path: &str) -> Option<RawBsonRef<'a>> {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment).ok().flatten()?;
        if segments.peek().is_none() {
            return Some(value);
        }
        match value {
            RawBsonRef::Document(child) => current = child,
            _ => return None,
        }
    }
    None
}

/// Finds a top-level key using ASCII case-insensitive matching.
#[must_use]
pub fn find_case_insensitive<'a>(doc: &'a RawDocument, key: &str) -> Option<RawBsonRef<'a>> {
    doc.into_iter()
        .map_while(Result::ok)
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Integer value of an int32/int64 element.
#[must_use]
pub fn as_integer(raw: RawBsonRef<'_>) -> Option<i64> {
    match raw {
        RawBsonRef::Int32(n) => Some(i64::from(n)),
        RawBsonRef::Int64(n) => Some(n),
        _ => None,
    }
}

/// Truthiness of an element: booleans as-is, numbers when non-zero,
/// null/undefined false, every other present value true.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn as_bool(raw: RawBsonRef<'_>) -> bool {
    match raw {
        RawBsonRef::Boolean(b) => b,
        RawBsonRef::Double(f) => f != 0.0,
        RawBsonRef::Int32(n) => n != 0,
        RawBsonRef::Int64(n) => n != 0,
        RawBsonRef::Null | RawBsonRef::Undefined => false,
        _ => true,
    }
}
