//! Compact storage for sampled JSON values.
//!
//! Values are decoded straight into a [`ValueStore`] without building a
//! `serde_json::Value` tree. Every value becomes a [`Tagged`]: a 4-bit kind tag
//! plus an index into one of the store's side tables. Null, booleans and
//! numbers carry no payload; only their kind matters for inference.
//!
//! A `Tagged` is only meaningful for the store that produced it.
use std::fmt;

use indexmap::IndexSet;
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};

use crate::config::InferenceConfig;
use crate::inference::str::{self as strings, StringFormat};

const TAG_BITS: u32 = 4;
const TAG_MASK: u32 = (1 << TAG_BITS) - 1;
const MAX_INDEX: usize = (u32::MAX >> TAG_BITS) as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Tag {
    Null = 0,
    False,
    True,
    Integer,
    Double,
    /// Short string, index into the string table.
    InternedString,
    /// Long string whose content was dropped.
    UninternedString,
    Object,
    Array,
    /// Recognized format without attributes; index of the format name.
    StringFormat,
    /// Recognized format with attributes; index of the raw text.
    TransformedString,
}

impl Tag {
    const ALL: [Tag; 11] = [
        Tag::Null,
        Tag::False,
        Tag::True,
        Tag::Integer,
        Tag::Double,
        Tag::InternedString,
        Tag::UninternedString,
        Tag::Object,
        Tag::Array,
        Tag::StringFormat,
        Tag::TransformedString,
    ];
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tagged(u32);

impl Tagged {
    fn new(tag: Tag, index: usize) -> Self {
        assert!(index <= MAX_INDEX, "value store table overflow");
        Tagged(((index as u32) << TAG_BITS) | tag as u32)
    }

    fn bare(tag: Tag) -> Self {
        Tagged(tag as u32)
    }

    pub fn tag(self) -> Tag {
        Tag::ALL[(self.0 & TAG_MASK) as usize]
    }

    pub fn index(self) -> usize {
        (self.0 >> TAG_BITS) as usize
    }
}

impl fmt::Debug for Tagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.tag(), self.index())
    }
}

/// A container being decoded. An object's members alternate key, value.
#[derive(Debug)]
enum Frame {
    Object { members: Vec<Tagged>, key: Option<usize> },
    Array { items: Vec<Tagged> },
}

#[derive(Debug)]
pub struct ValueStore {
    strings: IndexSet<String>,
    objects: Vec<Vec<Tagged>>,
    arrays: Vec<Vec<Tagged>>,
    stack: Vec<Frame>,
    root: Option<Tagged>,
    intern_max_len: usize,
    handle_refs: bool,
    infer_formats: bool,
}

impl ValueStore {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            strings: IndexSet::new(),
            objects: Vec::new(),
            arrays: Vec::new(),
            stack: Vec::new(),
            root: None,
            intern_max_len: config.intern_max_len,
            handle_refs: config.handle_refs,
            infer_formats: config.infer_string_formats,
        }
    }

    // ------------------------------ interning ------------------------------ //

    pub fn intern_string(&mut self, s: &str) -> usize {
        if let Some(i) = self.strings.get_index_of(s) {
            return i;
        }
        self.strings.insert_full(s.to_string()).0
    }

    pub fn string(&self, index: usize) -> &str {
        &self.strings[index]
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    // ------------------------------ committing ----------------------------- //

    fn commit(&mut self, value: Tagged) {
        match self.stack.last_mut() {
            None => {
                assert!(self.root.is_none(), "root value committed twice");
                self.root = Some(value);
            }
            Some(Frame::Object { members, key }) => {
                let key = key.take().expect("object value committed without a key");
                members.push(Tagged::new(Tag::InternedString, key));
                members.push(value);
            }
            Some(Frame::Array { items }) => items.push(value),
        }
    }

    pub fn commit_null(&mut self) {
        self.commit(Tagged::bare(Tag::Null));
    }

    pub fn commit_boolean(&mut self, value: bool) {
        self.commit(Tagged::bare(if value { Tag::True } else { Tag::False }));
    }

    pub fn commit_number(&mut self, is_double: bool) {
        self.commit(Tagged::bare(if is_double { Tag::Double } else { Tag::Integer }));
    }

    pub fn commit_string(&mut self, s: &str) {
        let value = if self.pending_key_is_ref() {
            Tagged::new(Tag::InternedString, self.intern_string(s))
        } else if let Some(format) = self.recognize(s) {
            if format.has_attribute_producer() {
                Tagged::new(Tag::TransformedString, self.intern_string(s))
            } else {
                Tagged::new(Tag::StringFormat, self.intern_string(format.name()))
            }
        } else if utf16_len_at_most(s, self.intern_max_len) {
            Tagged::new(Tag::InternedString, self.intern_string(s))
        } else {
            Tagged::bare(Tag::UninternedString)
        };
        self.commit(value);
    }

    fn recognize(&self, s: &str) -> Option<StringFormat> {
        if self.infer_formats { strings::recognize(s) } else { None }
    }

    fn pending_key_is_ref(&self) -> bool {
        self.handle_refs
            && matches!(self.stack.last(), Some(Frame::Object { key: Some(k), .. }) if self.strings[*k] == "$ref")
    }

    // ------------------------------ contexts ------------------------------- //

    pub fn push_object_context(&mut self) {
        self.stack.push(Frame::Object { members: Vec::new(), key: None });
    }

    pub fn push_array_context(&mut self) {
        self.stack.push(Frame::Array { items: Vec::new() });
    }

    /// Set the key for the next value committed into the current object.
    pub fn set_key(&mut self, key: &str) {
        let index = self.intern_string(key);
        match self.stack.last_mut() {
            Some(Frame::Object { key, .. }) => {
                assert!(key.is_none(), "object key set twice");
                *key = Some(index);
            }
            _ => panic!("object key outside an object context"),
        }
    }

    pub fn finish_object(&mut self) {
        let Some(Frame::Object { members, key }) = self.stack.pop() else {
            panic!("finish_object without an open object context");
        };
        assert!(key.is_none(), "object finished with a dangling key");
        self.objects.push(members);
        let t = Tagged::new(Tag::Object, self.objects.len() - 1);
        self.commit(t);
    }

    pub fn finish_array(&mut self) {
        let Some(Frame::Array { items }) = self.stack.pop() else {
            panic!("finish_array without an open array context");
        };
        self.arrays.push(items);
        let t = Tagged::new(Tag::Array, self.arrays.len() - 1);
        self.commit(t);
    }

    /// Take the root of the document just decoded.
    ///
    /// Panics when no root was committed or a container is still open; both
    /// mean the caller drove the store incorrectly.
    pub fn finish(&mut self) -> Tagged {
        assert!(self.stack.is_empty(), "{} parse contexts still open", self.stack.len());
        self.root.take().expect("no root value committed")
    }

    /// Drop a partially decoded document after a parse error.
    fn abandon(&mut self) {
        self.stack.clear();
        self.root = None;
    }

    // ------------------------------- decoding ------------------------------ //

    /// Decode one JSON document from text.
    pub fn parse_str(&mut self, src: &str) -> Result<Tagged, serde_json::Error> {
        let mut de = serde_json::Deserializer::from_str(src);
        let decoded = StoreSeed { store: self }.deserialize(&mut de).and_then(|()| de.end());
        match decoded {
            Ok(()) => Ok(self.finish()),
            Err(e) => {
                self.abandon();
                Err(e)
            }
        }
    }

    /// Record an already parsed document.
    pub fn add_value(&mut self, value: &serde_json::Value) -> Result<Tagged, serde_json::Error> {
        let decoded = StoreSeed { store: self }.deserialize(value);
        match decoded {
            Ok(()) => Ok(self.finish()),
            Err(e) => {
                self.abandon();
                Err(e)
            }
        }
    }

    // ------------------------------- reading ------------------------------- //

    /// Key/value pairs of an object, in document order.
    pub fn object_members(&self, t: Tagged) -> impl Iterator<Item = (&str, Tagged)> + '_ {
        assert_eq!(t.tag(), Tag::Object, "not an object: {t:?}");
        self.objects[t.index()]
            .chunks_exact(2)
            .map(|kv| (self.string(kv[0].index()), kv[1]))
    }

    pub fn object_len(&self, t: Tagged) -> usize {
        assert_eq!(t.tag(), Tag::Object, "not an object: {t:?}");
        self.objects[t.index()].len() / 2
    }

    pub fn array_items(&self, t: Tagged) -> &[Tagged] {
        assert_eq!(t.tag(), Tag::Array, "not an array: {t:?}");
        &self.arrays[t.index()]
    }

    /// Text behind an interned or transformed string.
    pub fn string_value(&self, t: Tagged) -> &str {
        match t.tag() {
            Tag::InternedString | Tag::TransformedString | Tag::StringFormat => self.string(t.index()),
            other => panic!("{other:?} carries no string"),
        }
    }

    pub fn string_format(&self, t: Tagged) -> Option<StringFormat> {
        match t.tag() {
            Tag::StringFormat => StringFormat::from_name(self.string(t.index())),
            Tag::TransformedString => strings::recognize(self.string(t.index())),
            _ => None,
        }
    }
}

fn utf16_len_at_most(s: &str, max: usize) -> bool {
    s.len() <= max || s.encode_utf16().count() <= max
}

/// Streams one JSON value into a [`ValueStore`].
struct StoreSeed<'a> {
    store: &'a mut ValueStore,
}

impl<'de> DeserializeSeed<'de> for StoreSeed<'_> {
    type Value = ();

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for StoreSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.store.commit_null();
        Ok(())
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        self.store.commit_null();
        Ok(())
    }

    fn visit_some<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        self.deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.store.commit_boolean(v);
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<(), E> {
        self.store.commit_number(false);
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<(), E> {
        self.store.commit_number(false);
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<(), E> {
        self.store.commit_number(true);
        Ok(())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.store.commit_string(v);
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let store = self.store;
        store.push_array_context();
        while seq.next_element_seed(StoreSeed { store: &mut *store })?.is_some() {}
        store.finish_array();
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let store = self.store;
        store.push_object_context();
        while let Some(key) = map.next_key::<String>()? {
            store.set_key(&key);
            map.next_value_seed(StoreSeed { store: &mut *store })?;
        }
        store.finish_object();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ValueStore {
        ValueStore::new(&InferenceConfig::default())
    }

    #[test]
    fn interning_is_idempotent() {
        let mut s = store();
        let a = s.intern_string("hello");
        let b = s.intern_string("world");
        assert_eq!(s.intern_string("hello"), a);
        assert_ne!(a, b);
        assert_eq!(s.string_count(), 2);
    }

    #[test]
    fn objects_store_alternating_members() {
        let mut s = store();
        let root = s.parse_str(r#"{"a": 1, "b": [true, null], "c": 1.5}"#).unwrap();
        assert_eq!(root.tag(), Tag::Object);
        let members: Vec<_> = s.object_members(root).map(|(k, v)| (k.to_string(), v.tag())).collect();
        assert_eq!(
            members,
            vec![
                ("a".to_string(), Tag::Integer),
                ("b".to_string(), Tag::Array),
                ("c".to_string(), Tag::Double),
            ]
        );
        let (_, b) = s.object_members(root).nth(1).unwrap();
        let tags: Vec<_> = s.array_items(b).iter().map(|t| t.tag()).collect();
        assert_eq!(tags, vec![Tag::True, Tag::Null]);
    }

    #[test]
    fn string_commit_policy() {
        let mut s = store();
        let long = "x".repeat(65);
        let root = s
            .add_value(&json!({
                "short": "abc",
                "long": long,
                "exactly": "y".repeat(64),
                "when": "2024-01-01T00:00:00Z",
                "id": "123e4567-e89b-12d3-a456-426614174000",
            }))
            .unwrap();
        let tags: Vec<_> = s.object_members(root).map(|(_, v)| v.tag()).collect();
        assert_eq!(
            tags,
            vec![
                Tag::InternedString,
                Tag::UninternedString,
                Tag::InternedString,
                Tag::TransformedString,
                Tag::StringFormat,
            ]
        );
        let (_, id) = s.object_members(root).nth(4).unwrap();
        assert_eq!(s.string_format(id), Some(StringFormat::Uuid));
        let (_, when) = s.object_members(root).nth(3).unwrap();
        assert_eq!(s.string_value(when), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn ref_values_are_always_interned() {
        let long_ref = format!("#/{}", "k".repeat(100));
        let mut plain = store();
        let root = plain.add_value(&json!({ "$ref": long_ref })).unwrap();
        assert_eq!(plain.object_members(root).next().unwrap().1.tag(), Tag::UninternedString);

        let mut refs = ValueStore::new(&InferenceConfig::default().with_refs());
        let root = refs.add_value(&json!({ "$ref": long_ref })).unwrap();
        let (_, v) = refs.object_members(root).next().unwrap();
        assert_eq!(v.tag(), Tag::InternedString);
        assert_eq!(refs.string_value(v), long_ref);
    }

    #[test]
    fn long_strings_count_utf16_units() {
        let mut s = store();
        // 40 astral characters are 80 UTF-16 units.
        let root = s.add_value(&json!("😀".repeat(40))).unwrap();
        assert_eq!(root.tag(), Tag::UninternedString);
    }

    #[test]
    fn store_decodes_several_documents() {
        let mut s = store();
        let a = s.parse_str("[1, 2]").unwrap();
        let b = s.parse_str("{\"x\": \"y\"}").unwrap();
        assert_eq!(a.tag(), Tag::Array);
        assert_eq!(b.tag(), Tag::Object);
        assert_eq!(s.array_items(a).len(), 2);
    }

    #[test]
    fn parse_errors_leave_the_store_usable() {
        let mut s = store();
        assert!(s.parse_str("[1, {\"a\": ").is_err());
        assert_eq!(s.parse_str("true").unwrap().tag(), Tag::True);
    }

    #[test]
    #[should_panic(expected = "root value committed twice")]
    fn double_root_commit_panics() {
        let mut s = store();
        s.commit_null();
        s.commit_null();
    }

    #[test]
    #[should_panic(expected = "parse contexts still open")]
    fn finish_with_open_context_panics() {
        let mut s = store();
        s.push_array_context();
        s.finish();
    }

    #[test]
    #[should_panic(expected = "no root value committed")]
    fn finish_without_root_panics() {
        store().finish();
    }

    #[test]
    #[should_panic(expected = "finish_array without an open array context")]
    fn popping_an_absent_context_panics() {
        store().finish_array();
    }
}
