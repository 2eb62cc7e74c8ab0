//! Persona Core - Domain Types
//!
//! Person entities, identity validation, list filters, errors and the
//! capability traits implemented by stores, metadata providers and
//! creators. Every other crate depends on this one.

pub mod capabilities;
pub mod error;
pub mod filter;
pub mod identity;
pub mod person;

pub use capabilities::{
    MetadataProvider, PersonCollector, PersonCreator, PersonDeleter, PersonFinder,
    PersonRepository, PersonSaver, PersonUpdater,
};
pub use error::{
    ConfigError, MetadataError, PersonaError, PersonaResult, ResultExt, StorageError,
    ValidationError,
};
pub use filter::PersonFilter;
pub use identity::Identity;
pub use person::{new_person_id, Person, PersonalMetaData};
