use serde::de::DeserializeOwned;

use crate::errors::HarnessError;

/// Decodes trimmed kcadm stdout into a typed record.
///
/// Structural decoding only: unknown fields are ignored and absent optional
/// fields become `None`, because the wrapped admin API's schema moves
/// between Keycloak versions. Empty or non-JSON input is a parse error, not
/// a default value.
pub fn parse<T: DeserializeOwned>(raw: &str) -> Result<T, HarnessError> {
    let trimmed = raw.trim();
    let value = serde_json::from_str(trimmed)?;
    Ok(value)
}
