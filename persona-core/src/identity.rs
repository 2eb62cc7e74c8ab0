//! Identity (name triple) of a person.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The immutable name portion of a person.
///
/// Construct through [`Identity::new`] to enforce the naming rules: name and
/// surname are required, and every present part is ASCII-alphabetic. An empty
/// patronymic means "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub surname: String,
    pub patronymic: String,
}

fn is_alpha(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic())
}

impl Identity {
    /// Validate and build an identity.
    ///
    /// Checks run in order name, surname, patronymic and the first failure
    /// is returned.
    pub fn new(
        name: impl Into<String>,
        surname: impl Into<String>,
        patronymic: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let surname = surname.into();
        let patronymic = patronymic.into();

        check_required("name", &name)?;
        check_required("surname", &surname)?;
        if !patronymic.is_empty() && !is_alpha(&patronymic) {
            return Err(ValidationError::InvalidCharacters {
                field: "patronymic",
                value: patronymic,
            });
        }

        Ok(Self {
            name,
            surname,
            patronymic,
        })
    }

    /// Patronymic, if present.
    pub fn patronymic(&self) -> Option<&str> {
        if self.patronymic.is_empty() {
            None
        } else {
            Some(&self.patronymic)
        }
    }

    /// Re-run the validation rules on an already built identity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(
            self.name.as_str(),
            self.surname.as_str(),
            self.patronymic.as_str(),
        )
        .map(|_| ())
    }
}

fn check_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if !is_alpha(value) {
        return Err(ValidationError::InvalidCharacters {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[name: {}, surname: {}, patronymic: {}]",
            self.name, self.surname, self.patronymic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identity() {
        let id = Identity::new("Ivan", "Ivanov", "Ivanovich").unwrap();
        assert_eq!(id.name, "Ivan");
        assert_eq!(id.surname, "Ivanov");
        assert_eq!(id.patronymic(), Some("Ivanovich"));
    }

    #[test]
    fn test_patronymic_is_optional() {
        let id = Identity::new("Ivan", "Ivanov", "").unwrap();
        assert_eq!(id.patronymic(), None);
    }

    #[test]
    fn test_validation_messages() {
        let cases = [
            (("", "test", "test"), "empty required name"),
            (
                ("test@test", "test", "test"),
                "name contains invalid characters: test@test",
            ),
            (("test", "", "test"), "empty required surname"),
            (
                ("test", "test@test", "test"),
                "surname contains invalid characters: test@test",
            ),
            (
                ("test", "test", "test@test"),
                "patronymic contains invalid characters: test@test",
            ),
        ];

        for ((name, surname, patronymic), expected) in cases {
            let err = Identity::new(name, surname, patronymic).unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_rejects_non_ascii_letters_and_digits() {
        assert!(Identity::new("Ivan1", "Ivanov", "").is_err());
        assert!(Identity::new("Иван", "Ivanov", "").is_err());
        assert!(Identity::new("Ivan", "Iva nov", "").is_err());
    }

    #[test]
    fn test_display() {
        let id = Identity::new("Ivan", "Ivanov", "").unwrap();
        assert_eq!(
            id.to_string(),
            "[name: Ivan, surname: Ivanov, patronymic: ]"
        );
    }
}
