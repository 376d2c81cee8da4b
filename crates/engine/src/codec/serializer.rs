//! Value serializers

use serde::{Deserialize, Serialize};
use stratadex_core::{Error, Result, Value};

/// Byte format of stored values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// MessagePack via `rmp-serde`
    #[default]
    MessagePack,
    /// JSON via `serde_json`
    Json,
}

impl SerializerKind {
    /// Encode one value
    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        match self {
            SerializerKind::MessagePack => {
                rmp_serde::to_vec(value).map_err(|e| Error::serialization(e.to_string()))
            }
            SerializerKind::Json => {
                serde_json::to_vec(value).map_err(|e| Error::serialization(e.to_string()))
            }
        }
    }

    /// Decode one value
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        match self {
            SerializerKind::MessagePack => {
                rmp_serde::from_slice(bytes).map_err(|e| Error::serialization(e.to_string()))
            }
            SerializerKind::Json => {
                serde_json::from_slice(bytes).map_err(|e| Error::serialization(e.to_string()))
            }
        }
    }
}
