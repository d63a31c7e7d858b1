use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::schema::canonizer::Canonizer;
use crate::schema::location::Location;
use crate::schema::reference::{Ref, normalize_address};
use crate::schema::store::SchemaStore;

/// A resolved reference: the owning document and where in it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub document: Rc<Value>,
    pub location: Location,
}

impl Resolved {
    pub fn schema(&self) -> Result<&Value, SchemaError> {
        self.location.canonical_ref.lookup_ref(&self.document)
    }
}

/// Fetches documents on demand and turns references into locations.
///
/// Fetch results, misses included, are cached by address for the life of the
/// resolver.
pub struct Resolver {
    canonizer: Canonizer,
    documents: HashMap<String, Option<Rc<Value>>>,
    store: Option<Box<dyn SchemaStore>>,
}

impl Resolver {
    pub fn new(store: Option<Box<dyn SchemaStore>>) -> Self {
        Self { canonizer: Canonizer::new(), documents: HashMap::new(), store }
    }

    /// Serve `document` for `address` without asking the store.
    pub fn add_document(&mut self, address: &str, document: Value) {
        self.documents.insert(normalize_address(address), Some(Rc::new(document)));
    }

    fn fetch(&mut self, address: &str) -> Result<Option<Rc<Value>>, SchemaError> {
        if let Some(cached) = self.documents.get(address) {
            return Ok(cached.clone());
        }
        let Some(store) = &self.store else {
            return Err(SchemaError::NoSchemaStore { address: address.to_string() });
        };
        let fetched = match store.fetch(address) {
            Ok(Some(document)) => {
                debug!(address, "fetched schema");
                Some(Rc::new(document))
            }
            Ok(None) => {
                debug!(address, "schema not found");
                None
            }
            Err(error) => {
                warn!(address, %error, "treating schema as absent");
                None
            }
        };
        self.documents.insert(address.to_string(), fetched.clone());
        Ok(fetched)
    }

    fn try_resolve(
        &mut self,
        fetch_base: &Location,
        lookup_base: &Location,
        virtual_ref: &Ref,
    ) -> Result<Option<Resolved>, SchemaError> {
        loop {
            let loc = self.canonizer.canonize(fetch_base, virtual_ref);
            let Some(address) = loc.canonical_ref.address().map(str::to_string) else {
                return Err(SchemaError::NoAddress { target: virtual_ref.clone() });
            };
            let Some(document) = self.fetch(&address)? else {
                return Ok(None);
            };
            // A newly scanned document may re-map the ref, so canonize again.
            if self.canonizer.add_schema(&document, &address) {
                debug!(%address, "scanned $id declarations");
                continue;
            }
            let lookup = self.canonizer.canonize(lookup_base, virtual_ref);
            let canonical_ref = lookup.canonical_ref.with_address(Some(address));
            let location = Location::new(canonical_ref, Some(lookup.virtual_ref), lookup.have_id);
            location.canonical_ref.lookup_ref(&document)?;
            return Ok(Some(Resolved { document, location }));
        }
    }

    pub fn resolve_virtual_ref(&mut self, base: &Location, virtual_ref: &Ref) -> Result<Resolved, SchemaError> {
        if let Some(resolved) = self.try_resolve(base, base, virtual_ref)? {
            return Ok(resolved);
        }
        let alternate_virtual = base.virtual_ref.with_address(base.canonical_ref.address().map(str::to_string));
        let alternate = Location::new(base.canonical_ref.clone(), Some(alternate_virtual), base.have_id);
        if let Some(resolved) = self.try_resolve(&alternate, base, virtual_ref)? {
            return Ok(resolved);
        }
        Err(SchemaError::RefNotFound { base: base.virtual_ref.clone(), target: virtual_ref.clone() })
    }

    pub fn resolve_top_level_ref(&mut self, reference: &Ref) -> Result<Resolved, SchemaError> {
        self.resolve_virtual_ref(&Location::empty(), reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::schema::store::InMemoryStore;
    use serde_json::json;

    /// Fails for `broken.json`, serves everything else from `inner`.
    struct FlakyStore {
        inner: InMemoryStore,
    }

    impl SchemaStore for FlakyStore {
        fn fetch(&self, address: &str) -> Result<Option<Value>, FetchError> {
            if address.ends_with("broken.json") {
                return Err(FetchError::Io { address: address.to_string(), source: std::io::Error::other("disk on fire") });
            }
            self.inner.fetch(address)
        }
    }

    #[test]
    fn resolves_across_documents() {
        let store = InMemoryStore::new()
            .with("http://example.com/root.json", json!({ "properties": { "a": { "$ref": "defs.json#/A" } } }))
            .with("http://example.com/defs.json", json!({ "A": { "type": "string" } }));
        let mut resolver = Resolver::new(Some(Box::new(store)));

        let top = resolver.resolve_top_level_ref(&Ref::parse("http://example.com/root.json")).unwrap();
        assert_eq!(top.location.canonical_ref.to_string(), "http://example.com/root.json#/");

        let at = top.location.push("properties").push("a");
        let a = resolver.resolve_virtual_ref(&at, &Ref::parse("defs.json#/A")).unwrap();
        assert_eq!(a.schema().unwrap(), &json!({ "type": "string" }));
        assert_eq!(a.location.canonical_ref.to_string(), "http://example.com/defs.json#/A");
    }

    #[test]
    fn ids_in_fetched_documents_are_honored() {
        let store = InMemoryStore::new().with(
            "root.json",
            json!({ "definitions": { "T": { "$id": "http://example.com/t.json", "type": "integer" } } }),
        );
        let mut resolver = Resolver::new(Some(Box::new(store)));
        let top = resolver.resolve_top_level_ref(&Ref::parse("root.json")).unwrap();
        let t = resolver.resolve_virtual_ref(&top.location, &Ref::parse("http://example.com/t.json")).unwrap();
        assert_eq!(t.location.canonical_ref.to_string(), "root.json#/definitions/T");
        assert_eq!(t.schema().unwrap()["type"], "integer");
    }

    #[test]
    fn missing_documents_and_keys() {
        let store = InMemoryStore::new().with("root.json", json!({}));
        let mut resolver = Resolver::new(Some(Box::new(store)));
        let missing = resolver.resolve_top_level_ref(&Ref::parse("nope.json")).unwrap_err();
        assert!(matches!(missing, SchemaError::RefNotFound { .. }));
        let key = resolver.resolve_top_level_ref(&Ref::parse("root.json#/x")).unwrap_err();
        assert!(matches!(key, SchemaError::MissingKey { .. }));
        let no_address = resolver.resolve_top_level_ref(&Ref::parse("#/x")).unwrap_err();
        assert!(matches!(no_address, SchemaError::NoAddress { .. }));
    }

    #[test]
    fn no_store_is_fatal_unless_preloaded() {
        let mut resolver = Resolver::new(None);
        resolver.add_document("inline.json", json!({ "type": "string" }));
        assert!(resolver.resolve_top_level_ref(&Ref::parse("inline.json")).is_ok());
        let err = resolver.resolve_top_level_ref(&Ref::parse("remote.json")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn store_failures_read_as_missing() {
        let inner = InMemoryStore::new().with("root.json", json!({ "a": { "$ref": "broken.json" } }));
        let mut resolver = Resolver::new(Some(Box::new(FlakyStore { inner })));
        let top = resolver.resolve_top_level_ref(&Ref::parse("root.json")).unwrap();
        let err = resolver
            .resolve_virtual_ref(&top.location.push("a"), &Ref::parse("broken.json"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::RefNotFound { .. }), "{err}");
        assert!(!err.is_fatal());
        assert!(resolver.resolve_top_level_ref(&Ref::parse("root.json#/a")).is_ok());
    }
}
