//! Person list filters.
//!
//! Callers pass filters as flat `key.value` tokens (`older-than.18`,
//! `nation.RU`). Tokens are parsed into a [`PersonFilter`] at the boundary
//! and never travel further as strings.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Token key for the exclusive lower age bound.
pub const OLDER_THAN: &str = "older-than";
/// Token key for the exclusive upper age bound.
pub const YOUNGER_THAN: &str = "younger-than";
/// Token key for gender equality.
pub const GENDER: &str = "gender";
/// Token key for nation membership (repeatable).
pub const NATION: &str = "nation";

/// Predicate set for listing persons. The empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFilter {
    /// Match `age > older_than`.
    pub older_than: Option<i32>,
    /// Match `age < younger_than`.
    pub younger_than: Option<i32>,
    /// Match `gender = gender`.
    pub gender: Option<String>,
    /// Match `nation IN nations`.
    pub nations: Vec<String>,
}

impl PersonFilter {
    /// Parse filter tokens.
    ///
    /// An empty value (`older-than.`) leaves that predicate unset. `nation`
    /// accumulates across tokens; for the other keys the last token wins.
    pub fn parse<I, S>(tokens: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = PersonFilter::default();
        for token in tokens {
            let token = token.as_ref();
            let (key, value) =
                token
                    .split_once('.')
                    .ok_or_else(|| ValidationError::MalformedFilter {
                        token: token.to_string(),
                    })?;

            match key {
                OLDER_THAN => {
                    if let Some(age) = parse_age(token, value)? {
                        filter.older_than = Some(age);
                    }
                }
                YOUNGER_THAN => {
                    if let Some(age) = parse_age(token, value)? {
                        filter.younger_than = Some(age);
                    }
                }
                GENDER => {
                    if !value.is_empty() {
                        filter.gender = Some(value.to_string());
                    }
                }
                NATION => {
                    if !value.is_empty() {
                        filter.nations.push(value.to_string());
                    }
                }
                _ => {
                    return Err(ValidationError::UnsupportedFilter {
                        token: token.to_string(),
                    })
                }
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.older_than.is_none()
            && self.younger_than.is_none()
            && self.gender.is_none()
            && self.nations.is_empty()
    }

    /// Evaluate the filter against a single row.
    ///
    /// Mirrors the SQL predicates produced by the query builder so that
    /// in-process stores answer `collect` the same way Postgres does.
    pub fn matches(&self, age: i32, gender: &str, nation: &str) -> bool {
        if let Some(min) = self.older_than {
            if age <= min {
                return false;
            }
        }
        if let Some(max) = self.younger_than {
            if age >= max {
                return false;
            }
        }
        if let Some(g) = &self.gender {
            if g != gender {
                return false;
            }
        }
        self.nations.is_empty() || self.nations.iter().any(|n| n == nation)
    }
}

fn parse_age(token: &str, value: &str) -> Result<Option<i32>, ValidationError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i32>()
        .map(Some)
        .map_err(|_| ValidationError::MalformedFilter {
            token: token.to_string(),
        })
}
