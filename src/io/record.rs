use serde::Deserialize;

use super::error::IoError;

/// Raw CSV record as read from input
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// A parsed `key,value` row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: f64,
}

impl RawRecord {
    /// Parse into a [`Record`]; the value must be a finite number
    pub fn parse(self) -> Result<Record, IoError> {
        let key = self
            .key
            .filter(|key| !key.is_empty())
            .ok_or(IoError::MissingField("key"))?;
        let raw_value = self
            .value
            .filter(|value| !value.is_empty())
            .ok_or(IoError::MissingField("value"))?;

        match raw_value.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Record { key, value }),
            _ => Err(IoError::InvalidValue { key, value: raw_value }),
        }
    }
}
