//! Flat storage projection of a person.
//!
//! A [`Record`] has the same shape as a `persons` row and as the cache hash
//! stored under `person:<id>`. Conversions in both directions are lossless.

use std::collections::BTreeMap;

use persona_core::{Identity, Person, PersonalMetaData, StorageError};
use serde::{Deserialize, Serialize};

/// Field/value map stored in the cache for one person.
pub type CacheHash = BTreeMap<String, String>;

pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_SURNAME: &str = "surname";
pub const FIELD_PATRONYMIC: &str = "patronymic";
pub const FIELD_NATION: &str = "nation";
pub const FIELD_GENDER: &str = "gender";
pub const FIELD_AGE: &str = "age";

/// Column/field names in storage order.
pub const FIELDS: [&str; 7] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_SURNAME,
    FIELD_PATRONYMIC,
    FIELD_NATION,
    FIELD_GENDER,
    FIELD_AGE,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub nation: String,
    pub gender: String,
    pub age: i32,
}

impl Record {
    /// Encode into the cache hash representation. Every field is written,
    /// including empty ones.
    pub fn to_hash(&self) -> CacheHash {
        let mut hash = CacheHash::new();
        hash.insert(FIELD_ID.to_string(), self.id.clone());
        hash.insert(FIELD_NAME.to_string(), self.name.clone());
        hash.insert(FIELD_SURNAME.to_string(), self.surname.clone());
        hash.insert(FIELD_PATRONYMIC.to_string(), self.patronymic.clone());
        hash.insert(FIELD_NATION.to_string(), self.nation.clone());
        hash.insert(FIELD_GENDER.to_string(), self.gender.clone());
        hash.insert(FIELD_AGE.to_string(), self.age.to_string());
        hash
    }

    /// Decode a cache hash.
    ///
    /// Missing text fields decode as empty and a missing age as `0`. An age
    /// that is not an integer is a codec error.
    pub fn from_hash(hash: &CacheHash) -> Result<Self, StorageError> {
        let text = |field: &str| hash.get(field).cloned().unwrap_or_default();

        let age = match hash.get(FIELD_AGE) {
            None => 0,
            Some(raw) if raw.is_empty() => 0,
            Some(raw) => raw.parse::<i32>().map_err(|e| StorageError::Codec {
                reason: format!("age {raw:?}: {e}"),
            })?,
        };

        Ok(Self {
            id: text(FIELD_ID),
            name: text(FIELD_NAME),
            surname: text(FIELD_SURNAME),
            patronymic: text(FIELD_PATRONYMIC),
            nation: text(FIELD_NATION),
            gender: text(FIELD_GENDER),
            age,
        })
    }
}

/// Hash fields for a partial metadata update: only present fields.
pub fn meta_patch(meta: &PersonalMetaData) -> CacheHash {
    let mut patch = CacheHash::new();
    if let Some(nation) = meta.nation() {
        patch.insert(FIELD_NATION.to_string(), nation.to_string());
    }
    if let Some(gender) = meta.gender() {
        patch.insert(FIELD_GENDER.to_string(), gender.to_string());
    }
    if let Some(age) = meta.age() {
        patch.insert(FIELD_AGE.to_string(), age.to_string());
    }
    patch
}

impl From<&Person> for Record {
    fn from(p: &Person) -> Self {
        Self {
            id: p.id.clone(),
            name: p.identity.name.clone(),
            surname: p.identity.surname.clone(),
            patronymic: p.identity.patronymic.clone(),
            nation: p.meta.nation.clone(),
            gender: p.meta.gender.clone(),
            age: p.meta.age,
        }
    }
}

impl From<Person> for Record {
    fn from(p: Person) -> Self {
        Self {
            id: p.id,
            name: p.identity.name,
            surname: p.identity.surname,
            patronymic: p.identity.patronymic,
            nation: p.meta.nation,
            gender: p.meta.gender,
            age: p.meta.age,
        }
    }
}

impl From<Record> for Person {
    fn from(r: Record) -> Self {
        Person {
            id: r.id,
            identity: Identity {
                name: r.name,
                surname: r.surname,
                patronymic: r.patronymic,
            },
            meta: PersonalMetaData {
                nation: r.nation,
                gender: r.gender,
                age: r.age,
            },
        }
    }
}
