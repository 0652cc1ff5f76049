//! Domain models for directory entities

mod group;
mod mapping;
mod member;
mod record;

pub use group::{GroupFilter, LocalGroup};
pub use mapping::{
    DEFAULT_UNIQUE_FIELD, FieldMapping, FieldMappingFile, FieldValues, MappingError,
};
pub use member::Member;
pub use record::{FieldPath, FieldPathError, RemoteRecord};
