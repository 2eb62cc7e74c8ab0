//! Person entity and its externally derived metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

/// Generate a new person identifier.
///
/// UUIDv7 strings sort by creation time, which keeps `ORDER BY id`
/// pagination stable for freshly ingested persons.
pub fn new_person_id() -> String {
    Uuid::now_v7().to_string()
}

/// Attributes looked up by name: nation code, gender and age.
///
/// Zero values (empty string, `0`) mean "absent". This is what partial
/// updates rely on: only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonalMetaData {
    pub nation: String,
    pub gender: String,
    pub age: i32,
}

impl PersonalMetaData {
    pub fn new(nation: impl Into<String>, gender: impl Into<String>, age: i32) -> Self {
        Self {
            nation: nation.into(),
            gender: gender.into(),
            age,
        }
    }

    /// True when no field is present. A non-positive age counts as absent.
    pub fn is_empty(&self) -> bool {
        self.nation().is_none() && self.gender().is_none() && self.age().is_none()
    }

    pub fn nation(&self) -> Option<&str> {
        (!self.nation.is_empty()).then_some(self.nation.as_str())
    }

    pub fn gender(&self) -> Option<&str> {
        (!self.gender.is_empty()).then_some(self.gender.as_str())
    }

    /// Age, if positive.
    pub fn age(&self) -> Option<i32> {
        (self.age > 0).then_some(self.age)
    }

    /// Overwrite the fields present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: &PersonalMetaData) {
        if let Some(nation) = patch.nation() {
            self.nation = nation.to_string();
        }
        if let Some(gender) = patch.gender() {
            self.gender = gender.to_string();
        }
        if let Some(age) = patch.age() {
            self.age = age;
        }
    }
}

/// A person record: identifier, identity and metadata.
///
/// `Person::default()` doubles as the not-found sentinel returned by store
/// lookups; check it with [`Person::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(flatten)]
    pub meta: PersonalMetaData,
}

impl Person {
    /// Build a person with a freshly generated identifier.
    pub fn new(identity: Identity, meta: PersonalMetaData) -> Self {
        Self {
            id: new_person_id(),
            identity,
            meta,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identity.name.is_empty() && self.identity.surname.is_empty() && self.meta.is_empty()
    }
}
