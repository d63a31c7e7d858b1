//! Positions inside schema documents.
//!
//! A [`Ref`] is an optional document address plus a JSON-Pointer-like path.
//! Addresses are normalized on construction, so two refs naming the same
//! place compare equal and can key the canonical-ref maps.

use std::fmt;

use serde_json::Value;
use url::Url;

use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathElement {
    /// The document root; only ever the first element.
    Root,
    KeyOrIndex(String),
    /// Synthetic: the n-th member of a type list.
    Type(usize),
    /// Synthetic: the object part of a schema.
    Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ref {
    address: Option<String>,
    path: Vec<PathElement>,
}

impl Ref {
    pub fn new(address: Option<String>, path: Vec<PathElement>) -> Self {
        Self { address: address.filter(|a| !a.is_empty()), path }
    }

    /// The root of the document at `address`.
    pub fn root(address: Option<String>) -> Self {
        Self::new(address, vec![PathElement::Root])
    }

    /// Parse `address#fragment`.
    ///
    /// An address with an empty fragment refers to the document root.
    pub fn parse(s: &str) -> Self {
        let (address, fragment) = s.split_once('#').unwrap_or((s, ""));
        let address = (!address.is_empty()).then(|| normalize_address(address));
        let path = if address.is_some() && fragment.is_empty() {
            vec![PathElement::Root]
        } else {
            parse_path(fragment)
        };
        Self { address, path }
    }

    pub fn parse_uri(uri: &Url) -> Self {
        Self::parse(uri.as_str())
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    pub fn with_address(&self, address: Option<String>) -> Ref {
        Ref::new(address, self.path.clone())
    }

    pub fn push(&self, key: &str) -> Ref {
        self.pushed(PathElement::KeyOrIndex(key.to_string()))
    }

    pub fn push_object(&self) -> Ref {
        self.pushed(PathElement::Object)
    }

    pub fn push_type(&self, index: usize) -> Ref {
        self.pushed(PathElement::Type(index))
    }

    fn pushed(&self, element: PathElement) -> Ref {
        let mut path = self.path.clone();
        path.push(element);
        Ref { address: self.address.clone(), path }
    }

    /// Absolutize the address against `base`; the path is kept as is, except
    /// that an empty path into a document means its root.
    pub fn resolve_against(&self, base: &Ref) -> Ref {
        let address = match (&self.address, &base.address) {
            (None, base) => base.clone(),
            (Some(own), None) => Some(own.clone()),
            (Some(own), Some(base)) => Some(join_address(own, base)),
        };
        let path = if address.is_some() && self.path.is_empty() {
            vec![PathElement::Root]
        } else {
            self.path.clone()
        };
        Ref { address, path }
    }

    /// Walk the path through `root`.
    pub fn lookup_ref<'v>(&self, root: &'v Value) -> Result<&'v Value, SchemaError> {
        let mut node = root;
        for element in &self.path {
            node = match element {
                PathElement::Root => root,
                PathElement::KeyOrIndex(key) => match node {
                    Value::Object(map) => map.get(key).ok_or_else(|| SchemaError::MissingKey {
                        at: self.clone(),
                        key: key.clone(),
                    })?,
                    Value::Array(items) => {
                        let index: usize = key.parse().map_err(|_| SchemaError::IndexNotNumeric {
                            at: self.clone(),
                            index: key.clone(),
                        })?;
                        items.get(index).ok_or_else(|| SchemaError::IndexOutOfRange {
                            at: self.clone(),
                            index,
                            len: items.len(),
                        })?
                    }
                    other => {
                        return Err(SchemaError::NotAContainer {
                            at: self.clone(),
                            key: key.clone(),
                            kind: value_kind(other),
                        });
                    }
                },
                PathElement::Type(_) | PathElement::Object => {
                    panic!("cannot look up synthetic path element in {self}")
                }
            };
        }
        Ok(node)
    }

    /// A human name for the referenced thing: the last non-index key, else
    /// the document's file stem.
    pub fn name(&self) -> String {
        let key = self.path.iter().rev().find_map(|e| match e {
            PathElement::KeyOrIndex(k) if !k.is_empty() && !k.bytes().all(|b| b.is_ascii_digit()) => {
                Some(k.clone())
            }
            _ => None,
        });
        key.or_else(|| self.address.as_deref().and_then(file_stem))
            .unwrap_or_else(|| "Something".to_string())
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(address) = &self.address {
            f.write_str(address)?;
            if self.path.is_empty() {
                return Ok(());
            }
        }
        f.write_str("#")?;
        let mut first = true;
        for element in &self.path {
            match element {
                PathElement::Root => {
                    f.write_str("/")?;
                    continue;
                }
                _ if !first => f.write_str("/")?,
                _ => {}
            }
            first = false;
            match element {
                PathElement::Root => {}
                PathElement::KeyOrIndex(key) => f.write_str(&escape(key))?,
                PathElement::Type(i) => write!(f, "type/{i}")?,
                PathElement::Object => f.write_str("object")?,
            }
        }
        Ok(())
    }
}

fn parse_path(fragment: &str) -> Vec<PathElement> {
    let mut path = Vec::new();
    let rest = match fragment.strip_prefix('/') {
        Some(rest) => {
            path.push(PathElement::Root);
            rest
        }
        None => fragment,
    };
    if !rest.is_empty() {
        path.extend(rest.split('/').map(|s| PathElement::KeyOrIndex(unescape(s))));
    }
    path
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Canonical spelling of a document address, without fragment.
pub fn normalize_address(address: &str) -> String {
    match Url::parse(address) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => normalize_path(address),
    }
}

fn join_address(address: &str, base: &str) -> String {
    if Url::parse(address).is_ok() {
        return normalize_address(address);
    }
    if let Ok(base) = Url::parse(base) {
        if let Ok(mut joined) = base.join(address) {
            joined.set_fragment(None);
            return joined.to_string();
        }
    }
    if address.starts_with('/') {
        return normalize_path(address);
    }
    let dir = base.rfind('/').map_or("", |i| &base[..=i]);
    normalize_path(&format!("{dir}{address}"))
}

/// Drop `.` segments and fold `..` into its parent where there is one.
fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    let segments: Vec<&str> = path.split('/').collect();
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.into_iter().enumerate() {
        match segment {
            "." => {}
            "" if i != last => {}
            ".." if matches!(out.last(), Some(&s) if s != "..") => {
                out.pop();
            }
            ".." if absolute => {}
            s => out.push(s),
        }
    }
    let joined = out.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

fn file_stem(address: &str) -> Option<String> {
    let last = address.trim_end_matches('/').rsplit('/').next()?;
    let stem = match last.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => last,
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn key(k: &str) -> PathElement {
        PathElement::KeyOrIndex(k.to_string())
    }

    #[test]
    fn parses_address_and_fragment() {
        let r = Ref::parse("http://example.com/s.json#/definitions/A");
        assert_eq!(r.address(), Some("http://example.com/s.json"));
        assert_eq!(r.path(), &[PathElement::Root, key("definitions"), key("A")]);

        let r = Ref::parse("#/a~1b/c~0d");
        assert_eq!(r.address(), None);
        assert_eq!(r.path(), &[PathElement::Root, key("a/b"), key("c~d")]);

        assert_eq!(Ref::parse("#a").path(), &[key("a")]);
        assert_eq!(Ref::parse("other.json").path(), &[PathElement::Root]);
        assert!(Ref::parse("#").path().is_empty());
    }

    #[test]
    fn parses_normalized_urls() {
        let url = Url::parse("https://Example.COM/a/../s.json#/definitions/A").unwrap();
        let r = Ref::parse_uri(&url);
        assert_eq!(r.address(), Some("https://example.com/s.json"));
        assert_eq!(r.path(), &[PathElement::Root, key("definitions"), key("A")]);
        assert_eq!(Ref::parse_uri(&Url::parse("file:///tmp/s.json").unwrap()).path(), &[PathElement::Root]);
    }

    #[test]
    fn resolves_relative_addresses() {
        let base = Ref::parse("http://example.com/schemas/root.json#/x");
        let r = Ref::parse("defs.json#/A").resolve_against(&base);
        assert_eq!(r.to_string(), "http://example.com/schemas/defs.json#/A");

        let local = Ref::parse("#/A").resolve_against(&base);
        assert_eq!(local.address(), Some("http://example.com/schemas/root.json"));

        let base = Ref::parse("schemas/nested/root.json");
        let r = Ref::parse("../defs.json").resolve_against(&base);
        assert_eq!(r.address(), Some("schemas/defs.json"));

        let abs = Ref::parse("https://other.org/x.json").resolve_against(&base);
        assert_eq!(abs.address(), Some("https://other.org/x.json"));

        let root = Ref::parse("#").resolve_against(&base);
        assert_eq!(root, Ref::parse("schemas/nested/root.json#/"));
    }

    #[test]
    fn equality_ignores_cosmetic_address_differences() {
        assert_eq!(Ref::parse("HTTP://Example.com/a/./b.json#/x"), Ref::parse("http://example.com/a/b.json#/x"));
        assert_eq!(Ref::parse("a/./b.json"), Ref::parse("a/b.json"));
    }

    #[test]
    fn lookup_walks_objects_and_arrays() {
        let doc = json!({ "definitions": { "A": { "oneOf": [{ "type": "string" }] } } });
        let r = Ref::parse("#/definitions/A/oneOf/0");
        assert_eq!(r.lookup_ref(&doc).unwrap(), &json!({ "type": "string" }));

        let missing = Ref::parse("#/definitions/B").lookup_ref(&doc).unwrap_err();
        assert!(matches!(missing, SchemaError::MissingKey { .. }));
        let bad = Ref::parse("#/definitions/A/oneOf/x").lookup_ref(&doc).unwrap_err();
        assert!(matches!(bad, SchemaError::IndexNotNumeric { .. }));
        let out = Ref::parse("#/definitions/A/oneOf/3").lookup_ref(&doc).unwrap_err();
        assert!(matches!(out, SchemaError::IndexOutOfRange { index: 3, len: 1, .. }));
        let leaf = Ref::parse("#/definitions/A/oneOf/0/type/x").lookup_ref(&doc).unwrap_err();
        assert!(matches!(leaf, SchemaError::NotAContainer { kind: "string", .. }));
    }

    #[test]
    #[should_panic(expected = "synthetic")]
    fn lookup_through_synthetic_elements_panics() {
        let _ = Ref::root(None).push_type(0).lookup_ref(&json!({}));
    }

    #[test]
    fn names() {
        assert_eq!(Ref::parse("#/definitions/Address").name(), "Address");
        assert_eq!(Ref::parse("#/items/0").name(), "items");
        assert_eq!(Ref::parse("http://x.org/person.schema.json").name(), "person.schema");
        assert_eq!(Ref::parse("#").name(), "Something");
    }

    fn key_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_~/ .-]{1,8}"
    }

    fn ref_strategy() -> impl Strategy<Value = Ref> {
        let address = prop::option::of(prop::sample::select(vec![
            "http://example.com/a.json",
            "https://example.org/dir/b.json",
            "schema.json",
            "dir/sub/c.json",
        ]));
        (address, any::<bool>(), prop::collection::vec(key_strategy(), 0..5)).prop_map(|(address, rooted, keys)| {
            let mut path = Vec::new();
            if rooted || address.is_some() {
                path.push(PathElement::Root);
            }
            path.extend(keys.into_iter().map(PathElement::KeyOrIndex));
            Ref::new(address.map(str::to_string), path)
        })
    }

    proptest! {
        #[test]
        fn display_then_parse_round_trips(r in ref_strategy()) {
            prop_assert_eq!(Ref::parse(&r.to_string()), r);
        }
    }
}
