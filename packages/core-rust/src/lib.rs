//! `NodeLink` Core: host values, the bounded BSON codec, execution options, and
//! operation descriptors.

pub mod codec;
pub mod error;
pub mod operation;
pub mod options;
pub mod value;
pub mod version;

pub use codec::{Codec, DEFAULT_MAX_DEPTH};
pub use error::{CodecError, Error, Result};
pub use operation::{
    BulkWrite, BulkWriteOptions, Command, CommandOptions, DeleteOptions, Query, QueryOptions,
    UpdateOptions, WriteModel,
};
pub use options::{
    Acknowledgment, ExecuteOptions, LegacyKey, OptionsArg, ReadConcern, ReadMode, ReadPreference,
    WriteConcern,
};
pub use value::{Map, Value};
