use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::trace;

use crate::schema::location::Location;
use crate::schema::reference::Ref;

/// Maps refs spelled through `$id`s onto the location they really name.
#[derive(Debug, Default)]
pub struct Canonizer {
    map: HashMap<Ref, Location>,
    added: HashSet<String>,
}

impl Canonizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a document for `$id`s. Returns `false` if `address` was already
    /// scanned.
    pub fn add_schema(&mut self, schema: &Value, address: &str) -> bool {
        if !self.added.insert(address.to_string()) {
            return false;
        }
        let root = Ref::root(Some(address.to_string()));
        self.add_ids(schema, Location::new(root, None, false));
        true
    }

    fn add_ids(&mut self, schema: &Value, loc: Location) {
        match schema {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.add_ids(item, loc.push(&i.to_string()));
                }
            }
            Value::Object(map) => {
                let without_id = loc.clone();
                let loc = match map.get("$id") {
                    Some(id @ Value::String(_)) => loc.update_with_id(id),
                    _ => loc,
                };
                if loc.have_id {
                    trace!(virtual_ref = %loc.virtual_ref, canonical = %without_id.canonical_ref, "$id");
                    self.map.insert(loc.virtual_ref.clone(), without_id);
                }
                for (key, value) in map {
                    self.add_ids(value, loc.push(key));
                }
            }
            _ => {}
        }
    }

    /// The location `reference` names when seen from `base`.
    ///
    /// Refs into documents that were not scanned yet get a best-effort
    /// canonical ref: the virtual path within the base's canonical document.
    pub fn canonize(&self, base: &Location, reference: &Ref) -> Location {
        let virtual_ref = reference.resolve_against(&base.virtual_ref);
        if let Some(loc) = self.map.get(&virtual_ref) {
            return loc.clone();
        }
        let address = virtual_ref
            .address()
            .or(base.canonical_ref.address())
            .map(str::to_string);
        Location::new(virtual_ref.with_address(address), Some(virtual_ref), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_schema_is_idempotent_per_address() {
        let mut c = Canonizer::new();
        assert!(c.add_schema(&json!({}), "a.json"));
        assert!(!c.add_schema(&json!({}), "a.json"));
        assert!(c.add_schema(&json!({}), "b.json"));
    }

    #[test]
    fn ids_alias_their_subtree() {
        let doc = json!({
            "definitions": {
                "thing": {
                    "$id": "http://example.com/thing.json",
                    "properties": { "x": { "type": "string" } }
                }
            }
        });
        let mut c = Canonizer::new();
        c.add_schema(&doc, "root.json");
        let base = Location::new(Ref::root(Some("root.json".into())), None, false);

        let loc = c.canonize(&base, &Ref::parse("http://example.com/thing.json"));
        assert_eq!(loc.canonical_ref.to_string(), "root.json#/definitions/thing");

        let loc = c.canonize(&base, &Ref::parse("http://example.com/thing.json#/properties/x"));
        assert_eq!(loc.canonical_ref.to_string(), "root.json#/definitions/thing/properties/x");
    }

    #[test]
    fn unknown_refs_fall_back_to_the_virtual_path() {
        let c = Canonizer::new();
        let base = Location::new(Ref::root(Some("root.json".into())), None, false);
        let loc = c.canonize(&base, &Ref::parse("#/definitions/A"));
        assert_eq!(loc.canonical_ref.to_string(), "root.json#/definitions/A");
        assert!(!loc.have_id);

        let loc = c.canonize(&base, &Ref::parse("other.json#/B"));
        assert_eq!(loc.canonical_ref.to_string(), "other.json#/B");
    }

    #[test]
    fn fragment_ids_resolve_within_the_document() {
        let doc = json!({ "$id": "#top", "definitions": { "A": { "$id": "#a" } } });
        let mut c = Canonizer::new();
        c.add_schema(&doc, "doc.json");
        let base = Location::new(Ref::root(Some("doc.json".into())), None, false);
        assert_eq!(c.canonize(&base, &Ref::parse("#a")).canonical_ref.to_string(), "doc.json#/definitions/A");
        assert_eq!(c.canonize(&base, &Ref::parse("#top")).canonical_ref.to_string(), "doc.json#/");
    }
}
