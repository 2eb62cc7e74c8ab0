//! Wire messages on the inbound and error streams.

use std::fmt;

use persona_core::{Identity, ValidationError};
use serde::{Deserialize, Serialize};

use crate::broker::BrokerError;

/// Inbound name triple, `{"Name", "Surname", "Patronymic"}`.
///
/// Lowercase keys are accepted too. Missing fields decode as empty strings
/// and are rejected later by identity validation, not by decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FioMessage {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Surname", alias = "surname")]
    pub surname: String,
    #[serde(rename = "Patronymic", alias = "patronymic")]
    pub patronymic: String,
}

impl FioMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_identity(&self) -> Result<Identity, ValidationError> {
        Identity::new(
            self.name.as_str(),
            self.surname.as_str(),
            self.patronymic.as_str(),
        )
    }
}

impl fmt::Display for FioMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[name: {}, surname: {}, patronymic: {}]",
            self.name, self.surname, self.patronymic
        )
    }
}

/// A message that could not be ingested, with the reason.
///
/// Published to the error stream as the original fields plus `"error"`.
/// Undecodable payloads are reported with empty name fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FioErrorMessage {
    #[serde(flatten)]
    pub message: FioMessage,
    pub error: String,
}

impl FioErrorMessage {
    pub fn new(message: FioMessage, error: impl fmt::Display) -> Self {
        Self {
            message,
            error: error.to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, BrokerError> {
        serde_json::to_vec(self).map_err(|e| BrokerError::Encode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_capitalized_keys() {
        let msg =
            FioMessage::decode(br#"{"Name":"Ivan","Surname":"Ivanov","Patronymic":"Ivanovich"}"#)
                .unwrap();
        assert_eq!(msg.name, "Ivan");
        assert_eq!(msg.surname, "Ivanov");
        assert_eq!(msg.patronymic, "Ivanovich");
    }

    #[test]
    fn test_decode_lowercase_and_missing_keys() {
        let msg = FioMessage::decode(br#"{"name":"Ivan"}"#).unwrap();
        assert_eq!(msg.name, "Ivan");
        assert!(msg.surname.is_empty());
        assert!(msg.patronymic.is_empty());
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(FioMessage::decode(b"not json").is_err());
        assert!(FioMessage::decode(br#"{"Name": 5}"#).is_err());
    }

    #[test]
    fn test_identity_validation_runs_on_conversion() {
        let msg = FioMessage {
            name: "Ivan".to_string(),
            surname: String::new(),
            patronymic: String::new(),
        };
        assert_eq!(
            msg.to_identity().unwrap_err().to_string(),
            "empty required surname"
        );
    }

    #[test]
    fn test_error_message_shape() {
        let report = FioErrorMessage::new(
            FioMessage {
                name: "Iv4n".to_string(),
                surname: "Ivanov".to_string(),
                patronymic: String::new(),
            },
            "name contains invalid characters: Iv4n",
        );
        let value: serde_json::Value = serde_json::from_slice(&report.encode().unwrap()).unwrap();
        assert_eq!(value["Name"], "Iv4n");
        assert_eq!(value["Surname"], "Ivanov");
        assert_eq!(value["Patronymic"], "");
        assert_eq!(value["error"], "name contains invalid characters: Iv4n");
    }
}
