//! Deserialization that reports where in the document it failed.
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("at JSON path {path} → {source}")]
pub struct PathError {
    pub path: String,
    #[source]
    pub source: serde_json::Error,
}

fn deserialize<'de, R, T>(mut de: serde_json::Deserializer<R>) -> Result<T, PathError>
where
    R: serde_json::de::Read<'de>,
    T: DeserializeOwned,
{
    let value = serde_path_to_error::deserialize::<_, T>(&mut de).map_err(|err| PathError {
        path: err.path().to_string(),
        source: err.into_inner(),
    })?;
    de.end().map_err(|source| PathError { path: ".".to_string(), source })?;
    Ok(value)
}

pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    deserialize(serde_json::Deserializer::from_str(src))
}

pub fn from_slice_with_path<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PathError> {
    deserialize(serde_json::Deserializer::from_slice(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;

    #[test]
    fn errors_name_the_offending_key() {
        let err = from_str_with_path::<InferenceConfig>(r#"{ "inferMaps": "yes" }"#).unwrap_err();
        assert_eq!(err.path, "inferMaps");
        assert!(err.to_string().starts_with("at JSON path inferMaps"));
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(from_slice_with_path::<serde_json::Value>(b"{} {}").is_err());
        assert!(from_slice_with_path::<serde_json::Value>(b"{}\n").is_ok());
    }
}
