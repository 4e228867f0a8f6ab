//! Operation descriptors.
//!
//! A descriptor is built once from caller-supplied values, validates and
//! encodes them up front, and is immutable afterwards (a [`BulkWrite`] is the
//! exception while operations are still being added). Constructors fail before
//! anything is encoded when an option is out of range.

pub mod bulk_write;
pub mod command;
pub mod query;

pub use bulk_write::{BulkWrite, BulkWriteOptions, DeleteOptions, UpdateOptions, WriteModel};
pub use command::{Command, CommandOptions};
pub use query::{Query, QueryOptions};
