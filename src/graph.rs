//! In-memory type graph.
//!
//! An arena of [`TypeKind`]s addressed by [`TypeRef`]. `get_*` constructors
//! hash-cons structurally equal types; `get_unique_*` constructors always
//! allocate a fresh node. Unions and intersections can be allocated before
//! their members are known, which is how forward and cyclic references are
//! tied off.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::attributes::TypeAttributes;
use crate::error::GraphError;
use crate::ir::{ClassProperty, PrimitiveKind, TypeKind, TypeRef};

#[derive(Debug, Default)]
pub struct TypeGraph {
    types: Vec<TypeKind>,
    attributes: Vec<TypeAttributes>,
    interned: HashMap<TypeKind, TypeRef>,
    top_levels: IndexMap<String, TypeRef>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ---------------------------- construction ----------------------------- //

    fn add(&mut self, kind: TypeKind, attributes: TypeAttributes) -> TypeRef {
        let t = TypeRef(self.types.len() as u32);
        self.types.push(kind);
        self.attributes.push(attributes);
        t
    }

    fn intern(&mut self, kind: TypeKind, attributes: TypeAttributes) -> TypeRef {
        if let Some(&t) = self.interned.get(&kind) {
            self.add_attributes(t, &attributes);
            return t;
        }
        let t = self.add(kind.clone(), attributes);
        self.interned.insert(kind, t);
        t
    }

    pub fn get_primitive_type(&mut self, primitive: PrimitiveKind, attributes: TypeAttributes) -> TypeRef {
        self.intern(TypeKind::Primitive { primitive }, attributes)
    }

    pub fn get_enum_type(&mut self, cases: BTreeSet<String>, attributes: TypeAttributes) -> TypeRef {
        self.intern(TypeKind::Enum { cases }, attributes)
    }

    pub fn get_array_type(&mut self, items: TypeRef, attributes: TypeAttributes) -> TypeRef {
        self.intern(TypeKind::Array { items }, attributes)
    }

    pub fn get_class_type(
        &mut self,
        properties: BTreeMap<String, ClassProperty>,
        attributes: TypeAttributes,
    ) -> TypeRef {
        self.intern(TypeKind::Class { properties }, attributes)
    }

    pub fn get_unique_class_type(
        &mut self,
        properties: BTreeMap<String, ClassProperty>,
        attributes: TypeAttributes,
    ) -> TypeRef {
        self.add(TypeKind::Class { properties }, attributes)
    }

    pub fn get_unique_object_type(
        &mut self,
        properties: BTreeMap<String, ClassProperty>,
        additional: Option<TypeRef>,
        attributes: TypeAttributes,
    ) -> TypeRef {
        self.add(TypeKind::Object { properties, additional }, attributes)
    }

    pub fn get_map_type(&mut self, values: TypeRef, attributes: TypeAttributes) -> TypeRef {
        self.intern(TypeKind::Map { values }, attributes)
    }

    /// A union of `members`, or the member itself when there is only one.
    pub fn get_union_type(&mut self, members: BTreeSet<TypeRef>, attributes: TypeAttributes) -> TypeRef {
        assert!(!members.is_empty(), "union without members");
        if members.len() == 1 {
            let only = *members.first().expect("one member");
            self.add_attributes(only, &attributes);
            return only;
        }
        self.intern(TypeKind::Union { members: Some(members) }, attributes)
    }

    pub fn get_unique_union_type(
        &mut self,
        members: Option<BTreeSet<TypeRef>>,
        attributes: TypeAttributes,
    ) -> TypeRef {
        self.add(TypeKind::Union { members }, attributes)
    }

    pub fn get_unique_intersection_type(
        &mut self,
        members: Option<BTreeSet<TypeRef>>,
        attributes: TypeAttributes,
    ) -> TypeRef {
        self.add(TypeKind::Intersection { members }, attributes)
    }

    /// Install the members of a placeholder union or intersection.
    ///
    /// Panics if `t` is not a set operation or already has members.
    pub fn set_set_operation_members(&mut self, t: TypeRef, new_members: BTreeSet<TypeRef>) {
        match &mut self.types[t.index()] {
            TypeKind::Union { members } | TypeKind::Intersection { members } => {
                assert!(members.is_none(), "members of {t} already set");
                *members = Some(new_members);
            }
            other => panic!("{t} is a {}, not a set operation", other.name()),
        }
    }

    pub fn make_class_property(&self, ty: TypeRef, optional: bool) -> ClassProperty {
        ClassProperty { ty, optional }
    }

    pub fn add_attributes(&mut self, t: TypeRef, attributes: &TypeAttributes) {
        if attributes.is_empty() {
            return;
        }
        self.attributes[t.index()].combine(attributes);
    }

    pub fn add_top_level(&mut self, name: &str, t: TypeRef) -> Result<(), GraphError> {
        if self.top_levels.contains_key(name) {
            return Err(GraphError::DuplicateTopLevel(name.to_string()));
        }
        self.top_levels.insert(name.to_string(), t);
        Ok(())
    }

    // ------------------------------- reading ------------------------------- //

    pub fn kind(&self, t: TypeRef) -> &TypeKind {
        &self.types[t.index()]
    }

    pub fn attributes(&self, t: TypeRef) -> &TypeAttributes {
        &self.attributes[t.index()]
    }

    pub fn members(&self, t: TypeRef) -> Option<&BTreeSet<TypeRef>> {
        match self.kind(t) {
            TypeKind::Union { members } | TypeKind::Intersection { members } => members.as_ref(),
            _ => None,
        }
    }

    pub fn top_levels(&self) -> &IndexMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn top_level(&self, name: &str) -> Option<TypeRef> {
        self.top_levels.get(name).copied()
    }

    pub fn primitive(&self, t: TypeRef) -> Option<PrimitiveKind> {
        match self.kind(t) {
            TypeKind::Primitive { primitive } => Some(*primitive),
            _ => None,
        }
    }

    /// For a union of `null` and exactly one other member, that member.
    pub fn nullable_inner(&self, t: TypeRef) -> Option<TypeRef> {
        let TypeKind::Union { members: Some(members) } = self.kind(t) else {
            return None;
        };
        if members.len() != 2 {
            return None;
        }
        let mut non_null = members
            .iter()
            .copied()
            .filter(|&m| self.primitive(m) != Some(PrimitiveKind::Null));
        let inner = non_null.next()?;
        non_null.next().is_none().then_some(inner)
    }

    // ------------------------------ rendering ------------------------------ //

    /// Structural JSON view of `t`.
    ///
    /// Single-member set operations collapse into their member, nested unions
    /// flatten, and a type reached again on its own path renders as
    /// `{"$recursive": index}`. Two graphs built from the same shapes describe
    /// identically even when their node numbering differs.
    pub fn describe(&self, t: TypeRef) -> Value {
        let mut stack = Vec::new();
        self.describe_in(t, &mut stack)
    }

    fn describe_in(&self, t: TypeRef, stack: &mut Vec<TypeRef>) -> Value {
        if stack.contains(&t) {
            return json!({ "$recursive": t.index() });
        }
        stack.push(t);
        let out = match self.kind(t) {
            TypeKind::Primitive { primitive } => Value::from(primitive.name()),
            TypeKind::Enum { cases } => json!({ "enum": cases }),
            TypeKind::Array { items } => json!({ "array": self.describe_in(*items, stack) }),
            TypeKind::Class { properties } => {
                json!({ "class": self.describe_properties(properties, stack) })
            }
            TypeKind::Object { properties, additional } => {
                let additional = match additional {
                    Some(a) => self.describe_in(*a, stack),
                    None => Value::Null,
                };
                json!({
                    "object": self.describe_properties(properties, stack),
                    "additional": additional,
                })
            }
            TypeKind::Map { values } => json!({ "map": self.describe_in(*values, stack) }),
            TypeKind::Union { members: None } | TypeKind::Intersection { members: None } => {
                json!({ "pending": t.index() })
            }
            TypeKind::Union { members: Some(_) } => {
                let mut arms = Vec::new();
                self.flatten_union(t, stack, &mut arms);
                collapse(arms, "union")
            }
            TypeKind::Intersection { members: Some(members) } => {
                let arms = members.iter().map(|m| self.describe_in(*m, stack)).collect();
                collapse(arms, "allOf")
            }
        };
        stack.pop();
        out
    }

    fn flatten_union(&self, t: TypeRef, stack: &mut Vec<TypeRef>, out: &mut Vec<Value>) {
        let Some(members) = self.members(t) else { return };
        for &m in members {
            if stack.contains(&m) {
                out.push(json!({ "$recursive": m.index() }));
                continue;
            }
            let nested = match self.kind(m) {
                TypeKind::Union { members: Some(_) } => true,
                TypeKind::Intersection { members: Some(ms) } => ms.len() == 1,
                _ => false,
            };
            if nested {
                stack.push(m);
                self.flatten_union(m, stack, out);
                stack.pop();
            } else {
                out.push(self.describe_in(m, stack));
            }
        }
    }

    fn describe_properties(&self, properties: &BTreeMap<String, ClassProperty>, stack: &mut Vec<TypeRef>) -> Value {
        let mut out = Map::new();
        for (name, p) in properties {
            let key = if p.optional { format!("{name}?") } else { name.clone() };
            out.insert(key, self.describe_in(p.ty, stack));
        }
        Value::Object(out)
    }

    /// Full dump: every node with its attributes, plus the top-levels.
    pub fn to_json(&self) -> Value {
        let types: Vec<Value> = self
            .types
            .iter()
            .zip(&self.attributes)
            .enumerate()
            .map(|(i, (kind, attributes))| {
                let mut v = serde_json::to_value(kind).unwrap_or(Value::Null);
                v["id"] = Value::from(i);
                if !attributes.is_empty() {
                    v["attributes"] = serde_json::to_value(attributes).unwrap_or(Value::Null);
                }
                v
            })
            .collect();
        let described: Map<String, Value> = self
            .top_levels
            .iter()
            .map(|(name, t)| (name.clone(), self.describe(*t)))
            .collect();
        json!({
            "topLevels": self.top_levels,
            "described": described,
            "types": types,
        })
    }
}

fn collapse(mut arms: Vec<Value>, key: &str) -> Value {
    arms.sort_by_cached_key(|v| v.to_string());
    arms.dedup();
    if arms.len() == 1 {
        return arms.remove(0);
    }
    let mut out = Map::new();
    out.insert(key.to_string(), Value::Array(arms));
    Value::Object(out)
}
