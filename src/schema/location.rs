use serde_json::Value;

use crate::schema::reference::Ref;

/// Where the converter is in a schema document.
///
/// `canonical_ref` identifies the node regardless of `$id` aliasing, while
/// `virtual_ref` is the position as spelled through the ids seen on the way
/// down. Locations are immutable; `push` returns a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub canonical_ref: Ref,
    pub virtual_ref: Ref,
    pub have_id: bool,
}

impl Location {
    pub fn new(canonical_ref: Ref, virtual_ref: Option<Ref>, have_id: bool) -> Self {
        let virtual_ref = virtual_ref.unwrap_or_else(|| canonical_ref.clone());
        Self { canonical_ref, virtual_ref, have_id }
    }

    /// No address and no path; the base for top-level references.
    pub fn empty() -> Self {
        Self::new(Ref::new(None, Vec::new()), None, false)
    }

    pub fn push(&self, key: &str) -> Location {
        Location {
            canonical_ref: self.canonical_ref.push(key),
            virtual_ref: self.virtual_ref.push(key),
            have_id: self.have_id,
        }
    }

    pub fn push_object(&self) -> Location {
        Location {
            canonical_ref: self.canonical_ref.push_object(),
            virtual_ref: self.virtual_ref.push_object(),
            have_id: self.have_id,
        }
    }

    pub fn push_type(&self, index: usize) -> Location {
        Location {
            canonical_ref: self.canonical_ref.push_type(index),
            virtual_ref: self.virtual_ref.push_type(index),
            have_id: self.have_id,
        }
    }

    /// Apply an `$id` found at this location. Non-string ids are ignored.
    pub fn update_with_id(&self, id: &Value) -> Location {
        let Value::String(id) = id else {
            return self.clone();
        };
        let virtual_ref = Ref::parse(id).resolve_against(&self.virtual_ref);
        Location { canonical_ref: self.canonical_ref.clone(), virtual_ref, have_id: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_move_only_the_virtual_ref() {
        let loc = Location::new(Ref::root(Some("doc.json".into())), None, false).push("definitions");
        let with_id = loc.update_with_id(&json!("http://example.com/thing.json"));
        assert!(with_id.have_id);
        assert_eq!(with_id.canonical_ref, loc.canonical_ref);
        assert_eq!(with_id.virtual_ref.to_string(), "http://example.com/thing.json#/");

        let fragment = loc.update_with_id(&json!("#anchor"));
        assert_eq!(fragment.virtual_ref.to_string(), "doc.json#anchor");

        assert_eq!(loc.update_with_id(&json!(3)), loc);
    }

    #[test]
    fn push_extends_both_refs() {
        let loc = Location::new(Ref::root(Some("a.json".into())), Some(Ref::root(Some("b.json".into()))), true);
        let pushed = loc.push("x").push_type(1);
        assert_eq!(pushed.canonical_ref.to_string(), "a.json#/x/type/1");
        assert_eq!(pushed.virtual_ref.to_string(), "b.json#/x/type/1");
        assert!(pushed.have_id);
    }
}
