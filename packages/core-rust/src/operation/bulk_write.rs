//! Bulk write descriptor: an ordered batch of insert/update/delete models.
//!
//! A bulk write is single-use. The dispatcher marks it executed before handing
//! it to the wire layer, and a second execution is rejected.

use bson::oid::ObjectId;
use bson::{doc, Bson, Document, RawDocumentBuf};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::value::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteOptions {
    pub ordered: bool,
    pub bypass_document_validation: Option<bool>,
    pub comment: Option<Value>,
    pub let_vars: Option<Value>,
}

impl Default for BulkWriteOptions {
    fn default() -> Self {
        Self {
            ordered: true,
            bypass_document_validation: None,
            comment: None,
            let_vars: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub multi: bool,
    pub upsert: bool,
    pub array_filters: Option<Vec<Value>>,
    pub collation: Option<Value>,
    pub hint: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    /// `true` deletes at most one matching document.
    pub limit: bool,
    pub collation: Option<Value>,
    pub hint: Option<Value>,
}

/// One queued write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    Insert {
        document: RawDocumentBuf,
    },
    Update {
        filter: RawDocumentBuf,
        /// Operator document, replacement document, or pipeline array.
        update: Bson,
        multi: bool,
        upsert: bool,
        /// `arrayFilters`, `collation`, `hint` when set.
        extra: Document,
    },
    Delete {
        filter: RawDocumentBuf,
        limit: bool,
        extra: Document,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkWrite {
    codec: Codec,
    options: BulkWriteOptions,
    models: Vec<WriteModel>,
    executed: bool,
}

impl BulkWrite {
    #[must_use]
    pub fn new(options: BulkWriteOptions) -> Self {
        Self::with_codec(Codec::default(), options)
    }

    #[must_use]
    pub fn with_codec(codec: Codec, options: BulkWriteOptions) -> Self {
        Self {
            codec,
            options,
            models: Vec::new(),
            executed: false,
        }
    }

    /// Queues an insert and returns the document's `_id`, generating an
    /// `ObjectId` (stored as the first key) when the document has none.
    ///
    /// # Errors
    ///
    /// `Decode` when the document cannot be encoded.
    pub fn insert(&mut self, document: &Value) -> Result<Bson> {
        let encoded = self.codec.encode_document(document)?;
        let existing = encoded.get("_id").cloned();
        let (id, document) = match existing {
            Some(id) => (id, encoded),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = doc! { "_id": id.clone() };
                for (key, value) in encoded {
                    with_id.insert(key, value);
                }
                (id, with_id)
            }
        };
        self.models.push(WriteModel::Insert {
            document: RawDocumentBuf::from_document(&document)?,
        });
        Ok(id)
    }

    /// Queues an update.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when an operator document mixes in plain keys, a
    /// replacement contains `$` keys, or `multi` is combined with a replacement.
    pub fn update(&mut self, filter: &Value, update: &Value, options: &UpdateOptions) -> Result<()> {
        let filter = self.codec.encode(filter)?;
        let update = match update {
            Value::Array(_) => self.codec.encode_bson(update)?,
            Value::Map(map) => {
                if is_operator_document(map)? {
                    Bson::Document(self.codec.encode_document(update)?)
                } else if options.multi {
                    return Err(Error::invalid_argument(
                        "Replacement document conflicts with true \"multi\" option",
                    ));
                } else {
                    Bson::Document(self.codec.encode_document(update)?)
                }
            }
            other => {
                return Err(Error::invalid_argument(format!(
                    "Expected update to be a mapping or pipeline, {} given",
                    other.type_name()
                )));
            }
        };

        let mut extra = Document::new();
        if let Some(filters) = &options.array_filters {
            let encoded = filters
                .iter()
                .map(|f| self.codec.encode_bson(f))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            extra.insert("arrayFilters", encoded);
        }
        self.put_optional(&mut extra, "collation", options.collation.as_ref())?;
        self.put_optional(&mut extra, "hint", options.hint.as_ref())?;

        self.models.push(WriteModel::Update {
            filter,
            update,
            multi: options.multi,
            upsert: options.upsert,
            extra,
        });
        Ok(())
    }

    /// Queues a delete.
    ///
    /// # Errors
    ///
    /// `Decode` when the filter cannot be encoded.
    pub fn delete(&mut self, filter: &Value, options: &DeleteOptions) -> Result<()> {
        let filter = self.codec.encode(filter)?;
        let mut extra = Document::new();
        self.put_optional(&mut extra, "collation", options.collation.as_ref())?;
        self.put_optional(&mut extra, "hint", options.hint.as_ref())?;
        self.models.push(WriteModel::Delete {
            filter,
            limit: options.limit,
            extra,
        });
        Ok(())
    }

    fn put_optional(&self, out: &mut Document, key: &str, value: Option<&Value>) -> Result<()> {
        if let Some(v) = value {
            out.insert(key, self.codec.encode_bson(v)?);
        }
        Ok(())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn models(&self) -> &[WriteModel] {
        &self.models
    }

    #[must_use]
    pub fn options(&self) -> &BulkWriteOptions {
        &self.options
    }

    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Bulk-level options as sent alongside the models.
    ///
    /// # Errors
    ///
    /// `Decode` when `comment` or `let` cannot be encoded.
    pub fn options_document(&self) -> Result<Document> {
        let mut out = doc! { "ordered": self.options.ordered };
        if let Some(bypass) = self.options.bypass_document_validation {
            out.insert("bypassDocumentValidation", bypass);
        }
        self.put_optional(&mut out, "comment", self.options.comment.as_ref())?;
        self.put_optional(&mut out, "let", self.options.let_vars.as_ref())?;
        Ok(out)
    }

    /// Claims the bulk for execution.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the bulk was already executed or holds no models.
    pub fn mark_executed(&mut self) -> Result<()> {
        if self.executed {
            return Err(Error::invalid_argument(
                "BulkWrite objects may only be executed once and this instance has already been executed",
            ));
        }
        if self.models.is_empty() {
            return Err(Error::invalid_argument("Cannot do an empty bulk write"));
        }
        self.executed = true;
        Ok(())
    }
}

/// `true` for `{$set: ...}`-style documents, `false` for replacements.
fn is_operator_document(map: &Map) -> Result<bool> {
    let operator = map.first().is_some_and(|(key, _)| key.starts_with('$'));
    for key in map.keys() {
        match (operator, key.starts_with('$')) {
            (true, false) => {
                return Err(Error::invalid_argument(format!(
                    "Invalid key '{key}': update only works with $ operators and pipelines"
                )));
            }
            (false, true) => {
                return Err(Error::invalid_argument(format!(
                    "Invalid key '{key}': replace prohibits $ operators"
                )));
            }
            _ => {}
        }
    }
    Ok(operator)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().collect())
    }

    #[test]
    fn insert_generates_leading_id() {
        let mut bulk = BulkWrite::new(BulkWriteOptions::default());
        let id = bulk.insert(&map(vec![("x", Value::Int(1))])).unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));

        let WriteModel::Insert { document } = &bulk.models()[0] else {
            panic!("expected insert");
        };
        let first = document.iter().next().unwrap().unwrap();
        assert_eq!(first.0, "_id");
    }

    #[test]
    fn insert_keeps_existing_id() {
        let mut bulk = BulkWrite::new(BulkWriteOptions::default());
        let id = bulk
            .insert(&map(vec![("x", Value::Int(1)), ("_id", Value::from("mine"))]))
            .unwrap();
        assert_eq!(id, Bson::String("mine".to_string()));
    }

    #[test]
    fn update_kinds() {
        let mut bulk = BulkWrite::new(BulkWriteOptions::default());
        let filter = map(vec![("x", Value::Int(1))]);
        let operators = map(vec![("$set", map(vec![("y", Value::Int(2))]))]);
        let replacement = map(vec![("y", Value::Int(2))]);
        let pipeline = Value::Array(vec![map(vec![("$set", map(vec![("y", Value::Int(2))]))])]);
        let multi = UpdateOptions {
            multi: true,
            ..UpdateOptions::default()
        };

        bulk.update(&filter, &operators, &multi).unwrap();
        bulk.update(&filter, &pipeline, &multi).unwrap();
        bulk.update(&filter, &replacement, &UpdateOptions::default()).unwrap();
        assert_eq!(bulk.count(), 3);
        assert!(matches!(&bulk.models()[1], WriteModel::Update { update: Bson::Array(_), .. }));

        let err = bulk.update(&filter, &replacement, &multi).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Replacement document conflicts with true \"multi\" option"
        );
    }

    #[test]
    fn mixed_update_documents_are_rejected() {
        let mut bulk = BulkWrite::new(BulkWriteOptions::default());
        let filter = map(vec![]);
        let mixed = map(vec![("$set", map(vec![])), ("y", Value::Int(1))]);
        let sneaky = map(vec![("y", Value::Int(1)), ("$set", map(vec![]))]);
        assert!(bulk.update(&filter, &mixed, &UpdateOptions::default()).is_err());
        assert!(bulk.update(&filter, &sneaky, &UpdateOptions::default()).is_err());
        assert!(bulk.update(&filter, &Value::Int(1), &UpdateOptions::default()).is_err());
        assert_eq!(bulk.count(), 0);
    }

    #[test]
    fn delete_records_limit_and_extras() {
        let mut bulk = BulkWrite::new(BulkWriteOptions::default());
        let options = DeleteOptions {
            limit: true,
            hint: Some(Value::from("x_1")),
            ..DeleteOptions::default()
        };
        bulk.delete(&map(vec![("x", Value::Int(1))]), &options).unwrap();
        let WriteModel::Delete { limit, extra, .. } = &bulk.models()[0] else {
            panic!("expected delete");
        };
        assert!(*limit);
        assert_eq!(extra, &doc! { "hint": "x_1" });
    }

    #[test]
    fn bulk_is_single_use() {
        let mut bulk = BulkWrite::new(BulkWriteOptions::default());
        assert_eq!(
            bulk.mark_executed().unwrap_err().to_string(),
            "Cannot do an empty bulk write"
        );

        bulk.delete(&map(vec![]), &DeleteOptions::default()).unwrap();
        bulk.mark_executed().unwrap();
        assert!(bulk.is_executed());
        assert!(bulk.mark_executed().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn options_document_defaults_to_ordered() {
        let bulk = BulkWrite::new(BulkWriteOptions {
            comment: Some(Value::from("nightly")),
            ..BulkWriteOptions::default()
        });
        assert_eq!(
            bulk.options_document().unwrap(),
            doc! { "ordered": true, "comment": "nightly" }
        );
    }
}
