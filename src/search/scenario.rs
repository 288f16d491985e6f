use serde::{ Deserialize, Deserializer, Serialize };
use std::fmt;

use crate::error::{ Error, Result };

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    Scalar,
    Binary,
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::Scalar => f.write_str("scalar"),
            CompressionType::Binary => f.write_str("binary"),
        }
    }
}

/// Declarative description of one index variant to provision.
///
/// `compression_type` must be present when deserialized, though it may be `null`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IndexScenario {
    pub name: String,
    #[serde(deserialize_with = "required_nullable")]
    pub compression_type: Option<CompressionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncate_dims: Option<u32>,
    #[serde(default)]
    pub discard_originals: bool,
    #[serde(default = "default_stored_embedding")]
    pub stored_embedding: bool,
}

const MAX_INDEX_NAME_LENGTH: usize = 128;

/// Index names the service accepts: 2 to 128 lowercase letters, digits or
/// dashes, starting and ending with a letter or digit, with no `--`.
pub fn validate_index_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::Configuration(format!("Invalid index name '{}': {}", name, reason)));

    if name.len() < 2 || name.len() > MAX_INDEX_NAME_LENGTH {
        return invalid("must be between 2 and 128 characters");
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return invalid("only lowercase letters, digits and dashes are allowed");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("--") {
        return invalid("consecutive dashes are not allowed");
    }
    Ok(())
}

fn default_stored_embedding() -> bool {
    true
}

// A plain `Option` field would silently default to `None` when the key is absent.
fn required_nullable<'de, D>(deserializer: D) -> std::result::Result<Option<CompressionType>, D::Error>
    where D: Deserializer<'de>
{
    Option::<CompressionType>::deserialize(deserializer)
}

impl IndexScenario {
    pub fn new(name: &str, compression_type: Option<CompressionType>) -> Self {
        Self {
            name: name.to_string(),
            compression_type,
            truncate_dims: None,
            discard_originals: false,
            stored_embedding: true,
        }
    }

    pub fn with_truncate_dims(mut self, dims: u32) -> Self {
        self.truncate_dims = Some(dims);
        self
    }

    pub fn with_discard_originals(mut self, discard: bool) -> Self {
        self.discard_originals = discard;
        self
    }

    pub fn with_stored_embedding(mut self, stored: bool) -> Self {
        self.stored_embedding = stored;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("Index scenario requires a non-empty name".into()));
        }
        if self.truncate_dims == Some(0) {
            return Err(
                Error::Configuration(
                    format!("Index scenario '{}': truncate_dims must be positive", self.name)
                )
            );
        }
        Ok(())
    }
}
