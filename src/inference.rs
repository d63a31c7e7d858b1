//! Sample-based type inference.
//!
//! Samples are streamed into a [`ValueStore`], then unified position by
//! position: every value seen at one logical position goes through a
//! [`UnionAccumulator`], and the nested objects and arrays it defers are
//! unified recursively. The result lands in a [`TypeGraph`].
//!
//! Objects of the form `{"$ref": "#/..."}` (when enabled) become intersection
//! placeholders that are only filled once the whole top-level type exists, so
//! a reference may point forward or back at its own ancestor.
pub mod obj;
pub mod store;
pub mod str;
pub mod union;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, trace};

use crate::attributes::TypeAttributes;
use crate::config::InferenceConfig;
use crate::error::{InferenceError, Result};
use crate::graph::TypeGraph;
use crate::ir::{PrimitiveKind, TypeKind, TypeRef};

pub use obj::ObjectShape;
pub use store::{Tag, Tagged, ValueStore};
pub use union::{UnifiedType, UnionAccumulator};

// ------------------------------- Driver ---------------------------------- //

/// Turns sampled values of one store into graph types.
pub struct TypeInference<'a> {
    store: &'a ValueStore,
    config: &'a InferenceConfig,
    graph: &'a mut TypeGraph,
    pending_refs: BTreeMap<TypeRef, BTreeSet<String>>,
}

impl<'a> TypeInference<'a> {
    pub fn new(store: &'a ValueStore, config: &'a InferenceConfig, graph: &'a mut TypeGraph) -> Self {
        Self { store, config, graph, pending_refs: BTreeMap::new() }
    }

    /// Unify every value sampled at one position into a single type.
    ///
    /// `attributes` go on the union when the position is a real union, or on
    /// the sole member when that member is not a primitive. No values at all
    /// give the `none` primitive.
    pub fn infer_type(&mut self, values: &[Tagged], attributes: TypeAttributes) -> TypeRef {
        let mut acc = UnionAccumulator::new();
        acc.add_all(self.store, values);
        let UnifiedType { primitives, mut primitive_attributes, enum_cases, objects, arrays } =
            acc.build(self.config);
        trace!(samples = values.len(), ?primitives, objects = objects.len(), arrays = arrays.len(), "unify");

        let mut members = BTreeSet::new();
        for primitive in primitives {
            let attrs = primitive_attributes.remove(&primitive).unwrap_or_default();
            members.insert(self.graph.get_primitive_type(primitive, attrs));
        }
        if let Some(cases) = enum_cases {
            members.insert(self.graph.get_enum_type(cases, TypeAttributes::empty()));
        }
        if !objects.is_empty() {
            members.insert(self.infer_object(&objects, TypeAttributes::empty()));
        }
        if !arrays.is_empty() {
            members.insert(self.infer_array(&arrays, TypeAttributes::empty()));
        }

        if members.len() > 1 {
            return self.graph.get_union_type(members, attributes);
        }
        match members.pop_first() {
            None => self.graph.get_primitive_type(PrimitiveKind::None, TypeAttributes::empty()),
            Some(only) => {
                if self.graph.primitive(only).is_none() {
                    self.graph.add_attributes(only, &attributes);
                }
                only
            }
        }
    }

    fn infer_array(&mut self, arrays: &[Tagged], attributes: TypeAttributes) -> TypeRef {
        let items: Vec<Tagged> = arrays
            .iter()
            .flat_map(|&a| self.store.array_items(a).iter().copied())
            .collect();
        let items = self.infer_type(&items, TypeAttributes::empty());
        self.graph.get_array_type(items, attributes)
    }

    fn infer_object(&mut self, objects: &[Tagged], attributes: TypeAttributes) -> TypeRef {
        let store = self.store;
        let shape = ObjectShape::collect(store, objects);

        if self.config.handle_refs {
            if let Some(targets) = shape.ref_targets(store, objects) {
                let placeholder = self.graph.get_unique_intersection_type(None, attributes);
                trace!(%placeholder, ?targets, "deferred $ref");
                self.pending_refs.insert(placeholder, targets);
                return placeholder;
            }
        }

        if shape.is_map(self.config) {
            debug!(keys = shape.properties.len(), "object unified as map");
            let values = self.infer_type(&shape.all_values(), TypeAttributes::empty());
            return self.graph.get_map_type(values, attributes);
        }

        let mut properties = BTreeMap::new();
        for (key, samples) in &shape.properties {
            let ty = self.infer_type(&samples.values, TypeAttributes::inferred_name(*key));
            let property = self.graph.make_class_property(ty, shape.is_optional(samples));
            properties.insert(key.to_string(), property);
        }
        self.graph.get_class_type(properties, attributes)
    }

    /// Fill every `$ref` placeholder created so far, walking references from
    /// `top`.
    ///
    /// A reference that walks through another placeholder resolves that one
    /// first, so the outcome does not depend on which placeholder was created
    /// first.
    pub fn resolve_pending_refs(&mut self, top: TypeRef) -> Result<(), InferenceError> {
        let placeholders: Vec<TypeRef> = self.pending_refs.keys().copied().collect();
        for placeholder in placeholders {
            self.resolve_placeholder(top, placeholder)?;
        }
        Ok(())
    }

    fn resolve_placeholder(&mut self, top: TypeRef, placeholder: TypeRef) -> Result<(), InferenceError> {
        // Already resolved on demand.
        let Some(targets) = self.pending_refs.remove(&placeholder) else {
            return Ok(());
        };
        let mut members = BTreeSet::new();
        for reference in &targets {
            members.insert(self.resolve_ref(top, reference)?);
        }
        self.graph.set_set_operation_members(placeholder, members);
        Ok(())
    }

    fn resolve_ref(&mut self, top: TypeRef, reference: &str) -> Result<TypeRef, InferenceError> {
        let Some(rest) = reference.strip_prefix("#/") else {
            return Err(InferenceError::RefNotRooted { reference: reference.to_string() });
        };
        let mut t = top;
        if rest.is_empty() {
            return Ok(t);
        }
        for raw in rest.split('/') {
            let segment = raw.replace("~1", "/").replace("~0", "~");
            let container = self.see_through(top, t, reference)?;
            t = self.step(container, &segment, reference)?;
        }
        Ok(t)
    }

    /// Skip over nullable unions and single references, resolving pending
    /// references on the way.
    fn see_through(&mut self, top: TypeRef, mut t: TypeRef, reference: &str) -> Result<TypeRef, InferenceError> {
        let mut seen = Vec::new();
        loop {
            if let TypeKind::Intersection { members: None } = self.graph.kind(t) {
                // Removed from the pending set but still empty: we are inside
                // its own resolution.
                if !self.pending_refs.contains_key(&t) {
                    return Err(InferenceError::RefCycle { reference: reference.to_string() });
                }
                self.resolve_placeholder(top, t)?;
            }
            if seen.contains(&t) {
                return Ok(t);
            }
            seen.push(t);
            match self.graph.kind(t) {
                TypeKind::Union { .. } => {
                    t = self
                        .graph
                        .nullable_inner(t)
                        .ok_or_else(|| InferenceError::RefIntoUnion { reference: reference.to_string() })?;
                }
                TypeKind::Intersection { members: Some(members) } if members.len() == 1 => {
                    t = members.iter().copied().next().unwrap_or(t);
                }
                _ => return Ok(t),
            }
        }
    }

    fn step(&self, t: TypeRef, segment: &str, reference: &str) -> Result<TypeRef, InferenceError> {
        match self.graph.kind(t) {
            TypeKind::Class { properties } | TypeKind::Object { properties, .. } => properties
                .get(segment)
                .map(|p| p.ty)
                .ok_or_else(|| InferenceError::RefMissingProperty {
                    reference: reference.to_string(),
                    property: segment.to_string(),
                }),
            TypeKind::Map { values } => Ok(*values),
            TypeKind::Array { items } => {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(InferenceError::RefBadIndex {
                        reference: reference.to_string(),
                        segment: segment.to_string(),
                    });
                }
                Ok(*items)
            }
            other => Err(InferenceError::RefIntoNonComposite {
                reference: reference.to_string(),
                kind: other.name(),
            }),
        }
    }
}

// ------------------------------ Front API -------------------------------- //

/// Collects samples for one top-level type.
///
/// ```
/// use json_typegraph::{Inference, InferenceConfig, TypeGraph};
/// use serde_json::json;
///
/// let mut inference = Inference::new(InferenceConfig::default());
/// inference.observe_value(&json!({ "a": 1 })).unwrap();
/// inference.observe_value(&json!({ "a": "x" })).unwrap();
/// let mut graph = TypeGraph::new();
/// let root = inference.solve(&mut graph, "Root").unwrap();
/// assert_eq!(
///     graph.describe(root),
///     json!({ "class": { "a": { "union": ["integer", "string"] } } })
/// );
/// ```
pub struct Inference {
    config: InferenceConfig,
    store: ValueStore,
    roots: Vec<Tagged>,
}

impl Inference {
    pub fn new(config: InferenceConfig) -> Self {
        let store = ValueStore::new(&config);
        Self { config, store, roots: Vec::new() }
    }

    pub fn observe_str(&mut self, src: &str) -> Result<(), InferenceError> {
        let root = self.store.parse_str(src)?;
        self.roots.push(root);
        Ok(())
    }

    pub fn observe_value(&mut self, value: &Value) -> Result<(), InferenceError> {
        let root = self.store.add_value(value)?;
        self.roots.push(root);
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.roots.len()
    }

    /// Unify every observed sample and register the result as top-level `name`.
    pub fn solve(self, graph: &mut TypeGraph, name: &str) -> Result<TypeRef> {
        if self.roots.is_empty() {
            return Err(InferenceError::NoSamples { name: name.to_string() }.into());
        }
        debug!(name, samples = self.roots.len(), strings = self.store.string_count(), "solving");
        let mut driver = TypeInference::new(&self.store, &self.config, graph);
        let top = driver.infer_type(&self.roots, TypeAttributes::given_name(name));
        driver.resolve_pending_refs(top)?;
        graph.add_top_level(name, top)?;
        Ok(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;
    use serde_json::json;

    fn solve_with(config: InferenceConfig, samples: &[Value]) -> (TypeGraph, TypeRef) {
        let mut inference = Inference::new(config);
        for s in samples {
            inference.observe_value(s).unwrap();
        }
        let mut graph = TypeGraph::new();
        let root = inference.solve(&mut graph, "Root").unwrap();
        (graph, root)
    }

    fn describe(samples: &[Value]) -> Value {
        let (graph, root) = solve_with(InferenceConfig::default(), samples);
        graph.describe(root)
    }

    #[test]
    fn property_unifies_across_instances() {
        let out = describe(&[json!([{ "a": 1 }, { "a": "x" }])]);
        assert_eq!(out, json!({ "array": { "class": { "a": { "union": ["integer", "string"] } } } }));
    }

    #[test]
    fn date_time_strings_stay_date_time() {
        let (graph, root) = solve_with(InferenceConfig::default(), &[json!({ "n": "2024-01-01T00:00:00Z" })]);
        assert_eq!(graph.describe(root), json!({ "class": { "n": "date-time" } }));
        let TypeKind::Class { properties } = graph.kind(root) else { panic!("not a class") };
        let n = properties["n"].ty;
        assert!(graph.attributes(n).date_time.unwrap().always_offset);
    }

    #[test]
    fn missing_keys_make_properties_optional() {
        let out = describe(&[json!({ "a": 1, "b": true }), json!({ "a": 2, "b": null }), json!({ "a": 3 })]);
        assert_eq!(out, json!({ "class": { "a": "integer", "b?": { "union": ["bool", "null"] } } }));
    }

    #[test]
    fn empty_containers() {
        assert_eq!(describe(&[json!([])]), json!({ "array": "none" }));
        assert_eq!(describe(&[json!({})]), json!({ "class": {} }));
    }

    #[test]
    fn class_names_come_from_keys_and_top_level() {
        let (graph, root) = solve_with(InferenceConfig::default(), &[json!({ "address": { "city": "x" } })]);
        assert_eq!(graph.attributes(root).names.preferred(), Some("Root"));
        let TypeKind::Class { properties } = graph.kind(root) else { panic!("not a class") };
        let address = properties["address"].ty;
        assert!(graph.attributes(address).names.inferred.contains("address"));
        assert_eq!(graph.top_level("Root"), Some(root));
    }

    fn wide_object(keys: usize) -> Value {
        let mut map = serde_json::Map::new();
        for i in 0..keys {
            let v = if i % 2 == 0 { json!(i) } else { json!(format!("v{i}")) };
            map.insert(format!("k{i}"), v);
        }
        Value::Object(map)
    }

    #[test]
    fn map_threshold() {
        let (graph, root) = solve_with(InferenceConfig::default(), &[wide_object(500)]);
        let TypeKind::Class { properties } = graph.kind(root) else { panic!("expected a class") };
        assert_eq!(properties.len(), 500);

        let (graph, root) = solve_with(InferenceConfig::default(), &[wide_object(501)]);
        assert_eq!(graph.describe(root), json!({ "map": { "union": ["integer", "string"] } }));

        let config = InferenceConfig { infer_maps: false, ..InferenceConfig::default() };
        let (graph, root) = solve_with(config, &[wide_object(501)]);
        assert!(matches!(graph.kind(root), TypeKind::Class { .. }));
    }

    #[test]
    fn keys_spread_over_instances_count_toward_the_threshold() {
        let config = InferenceConfig { map_threshold: 3, ..InferenceConfig::default() };
        let samples: Vec<Value> = (0..4).map(|i| json!({ format!("id{i}"): true })).collect();
        let (graph, root) = solve_with(config, &samples);
        assert_eq!(graph.describe(root), json!({ "map": "bool" }));
    }

    #[test]
    fn refs_resolve_after_the_whole_pass() {
        let sample = json!({
            "name": "root",
            "children": [{ "$ref": "#/" }],
            "first": { "$ref": "#/items/0" },
            "items": [{ "id": 1 }],
        });
        let (graph, root) = solve_with(InferenceConfig::default().with_refs(), &[sample]);
        let TypeKind::Class { properties } = graph.kind(root) else { panic!("not a class") };

        let children = properties["children"].ty;
        let TypeKind::Array { items } = graph.kind(children) else { panic!("not an array") };
        assert_eq!(graph.members(*items), Some(&BTreeSet::from([root])));

        let first = properties["first"].ty;
        let TypeKind::Array { items: item } = graph.kind(properties["items"].ty) else { panic!() };
        assert_eq!(graph.members(first), Some(&BTreeSet::from([*item])));
    }

    #[test]
    fn refs_are_plain_objects_when_disabled() {
        let out = describe(&[json!({ "x": { "$ref": "#/" } })]);
        assert_eq!(out, json!({ "class": { "x": { "class": { "$ref": "string" } } } }));
    }

    #[test]
    fn ref_errors() {
        let cases = [
            (json!({ "a": { "$ref": "other.json#/a" } }), "not rooted"),
            (json!({ "a": { "$ref": "#/missing" } }), "does not exist"),
            (json!({ "a": 1, "b": { "$ref": "#/a/x" } }), "non-composite"),
            (json!({ "xs": [1], "b": { "$ref": "#/xs/first" } }), "not an array index"),
            (json!({ "u": [1, "s"], "b": { "$ref": "#/u/0/x" } }), "not nullable"),
        ];
        for (sample, expected) in cases {
            let mut inference = Inference::new(InferenceConfig::default().with_refs());
            inference.observe_value(&sample).unwrap();
            let err = inference.solve(&mut TypeGraph::new(), "Root").unwrap_err();
            assert!(matches!(err, Error::Inference(_)), "{err}");
            assert!(err.to_string().contains(expected), "{sample}: {err}");
        }
    }

    #[test]
    fn refs_through_other_refs_ignore_key_order() {
        for via in ["a", "z"] {
            let sample = json!({
                (via): { "$ref": "#/b" },
                "b": { "x": 1 },
                "c": { "$ref": format!("#/{via}/x") },
            });
            let (graph, root) = solve_with(InferenceConfig::default().with_refs(), &[sample]);
            let TypeKind::Class { properties } = graph.kind(root) else { panic!("not a class") };
            assert_eq!(graph.describe(properties["c"].ty), json!("integer"), "via {via}");
        }
    }

    #[test]
    fn ref_through_itself_is_a_cycle() {
        let mut inference = Inference::new(InferenceConfig::default().with_refs());
        inference.observe_value(&json!({ "a": { "$ref": "#/a/x" } })).unwrap();
        let err = inference.solve(&mut TypeGraph::new(), "Root").unwrap_err();
        assert!(matches!(err, Error::Inference(InferenceError::RefCycle { .. })), "{err}");
    }

    #[test]
    fn escaped_ref_segments() {
        let sample = json!({ "a/b": { "c~d": 1 }, "r": { "$ref": "#/a~1b/c~0d" } });
        let (graph, root) = solve_with(InferenceConfig::default().with_refs(), &[sample]);
        let TypeKind::Class { properties } = graph.kind(root) else { panic!() };
        let r = properties["r"].ty;
        assert_eq!(graph.describe(r), json!("integer"));
    }

    #[test]
    fn no_samples_is_an_error() {
        let err = Inference::new(InferenceConfig::default())
            .solve(&mut TypeGraph::new(), "Empty")
            .unwrap_err();
        assert!(matches!(err, Error::Inference(InferenceError::NoSamples { .. })));
    }

    #[test]
    fn bad_json_is_reported_and_skipped() {
        let mut inference = Inference::new(InferenceConfig::default());
        assert!(inference.observe_str("{\"a\": ").is_err());
        inference.observe_str("{\"a\": true}").unwrap();
        assert_eq!(inference.sample_count(), 1);
    }

    fn sample() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            (-1.0e6..1.0e6f64).prop_map(|f| json!(f + 0.5)),
            prop::sample::select(vec!["a".to_string(), "b".into(), "2024-01-01".into(), "x".repeat(80)])
                .prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map(prop::sample::select(vec!["p", "q", "r"]), inner, 0..3)
                    .prop_map(|m| Value::Object(m.into_iter().map(|(k, v)| (k.to_string(), v)).collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn unification_ignores_sample_order(
            (samples, shuffled) in prop::collection::vec(sample(), 1..8)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            prop_assert_eq!(describe(&samples), describe(&shuffled));
        }
    }
}
