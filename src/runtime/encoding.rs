//! Wire encodings for typed objects

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::ContextResult;

/// Encoding used to (un)marshal typed objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Compact JSON
    #[default]
    Json,
    /// Indented JSON (decodes like `Json`)
    PrettyJson,
}

impl Encoding {
    pub fn marshal<T: Serialize + ?Sized>(&self, value: &T) -> ContextResult<Vec<u8>> {
        let data = match self {
            Encoding::Json => serde_json::to_vec(value)?,
            Encoding::PrettyJson => serde_json::to_vec_pretty(value)?,
        };
        Ok(data)
    }

    pub fn unmarshal<T: DeserializeOwned>(&self, data: &[u8]) -> ContextResult<T> {
        Ok(serde_json::from_slice(data)?)
    }
}
