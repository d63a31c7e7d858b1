//! Where schema documents come from.
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::Value;
use url::Url;

use crate::error::FetchError;
use crate::schema::reference::normalize_address;

/// Fetches a schema document by normalized address.
///
/// `Ok(None)` means the store has no such document.
pub trait SchemaStore {
    fn fetch(&self, address: &str) -> Result<Option<Value>, FetchError>;
}

/// Documents supplied up front.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    documents: HashMap<String, Value>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: &str, document: Value) {
        self.documents.insert(normalize_address(address), document);
    }

    pub fn with(mut self, address: &str, document: Value) -> Self {
        self.insert(address, document);
        self
    }
}

impl SchemaStore for InMemoryStore {
    fn fetch(&self, address: &str) -> Result<Option<Value>, FetchError> {
        Ok(self.documents.get(address).cloned())
    }
}

/// Reads local files, given as plain paths or `file://` URLs.
///
/// Other URL schemes are never found.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStore;

impl SchemaStore for FileStore {
    fn fetch(&self, address: &str) -> Result<Option<Value>, FetchError> {
        let path = match Url::parse(address) {
            Ok(url) if url.scheme() == "file" => match url.to_file_path() {
                Ok(path) => path,
                Err(()) => return Ok(None),
            },
            Ok(_) => return Ok(None),
            Err(_) => PathBuf::from(address),
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FetchError::Io { address: address.to_string(), source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| FetchError::Parse { address: address.to_string(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_memory_store_normalizes_addresses() {
        let store = InMemoryStore::new().with("HTTP://Example.com/./a.json", json!({ "type": "string" }));
        assert!(store.fetch("http://example.com/a.json").unwrap().is_some());
        assert!(store.fetch("http://example.com/b.json").unwrap().is_none());
    }

    #[test]
    fn file_store_reads_paths_and_file_urls() {
        let dir = std::env::temp_dir().join(format!("json-typegraph-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.json");
        let bad = dir.join("bad.json");
        std::fs::write(&good, r#"{"type": "integer"}"#).unwrap();
        std::fs::write(&bad, "{ nope").unwrap();

        let store = FileStore;
        let by_path = store.fetch(good.to_str().unwrap()).unwrap();
        assert_eq!(by_path, Some(json!({ "type": "integer" })));
        let url = Url::from_file_path(&good).unwrap();
        assert!(store.fetch(url.as_str()).unwrap().is_some());

        assert!(store.fetch(dir.join("missing.json").to_str().unwrap()).unwrap().is_none());
        assert!(matches!(store.fetch(bad.to_str().unwrap()), Err(FetchError::Parse { .. })));
        assert!(store.fetch("https://example.com/remote.json").unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
