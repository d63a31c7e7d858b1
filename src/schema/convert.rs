//! JSON Schema to graph types.
//!
//! Every schema node becomes an intersection. It is registered under the
//! node's canonical ref before anything below it is converted, so a `$ref`
//! cycle finds the placeholder instead of recursing forever. The members are
//! installed once the node is done:
//!
//! - a union of the primitive, string, array and object types the node admits,
//!   when `type`, `enum`, `const` or any structural keyword is present;
//! - the converted `$ref` target;
//! - every `allOf` case;
//! - a union of the `oneOf` cases and one of the `anyOf` cases.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value};
use tracing::trace;

use crate::attributes::TypeAttributes;
use crate::error::SchemaError;
use crate::graph::TypeGraph;
use crate::inference::str::StringFormat;
use crate::ir::{ClassProperty, PrimitiveKind, TypeRef};
use crate::schema::location::Location;
use crate::schema::producers::{AttributeProducer, ProducedAttributes};
use crate::schema::reference::{Ref, value_kind};
use crate::schema::resolver::{Resolved, Resolver};

/// The type names JSON Schema's `type` keyword knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    String,
    Integer,
}

impl JsonType {
    pub const ALL: [JsonType; 7] = [
        JsonType::Null,
        JsonType::Boolean,
        JsonType::Object,
        JsonType::Array,
        JsonType::Number,
        JsonType::String,
        JsonType::Integer,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Integer => "integer",
        }
    }

    /// Whether `value` is an instance of this type.
    pub fn admits(self, value: &Value) -> bool {
        match self {
            JsonType::Null => value.is_null(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::Number => value.is_number(),
            JsonType::String => value.is_string(),
            JsonType::Integer => {
                value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
        }
    }

    /// The narrowest type of a `const` value.
    fn of_value(value: &Value) -> JsonType {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) if JsonType::Integer.admits(value) => JsonType::Integer,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

/// The shapes a schema value can take.
enum SchemaNode<'s> {
    Boolean(bool),
    Object(&'s Map<String, Value>),
    List(&'s [Value]),
}

impl<'s> SchemaNode<'s> {
    fn classify(value: &'s Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(SchemaNode::Boolean(*b)),
            Value::Object(map) => Some(SchemaNode::Object(map)),
            Value::Array(items) => Some(SchemaNode::List(items)),
            _ => None,
        }
    }
}

/// Converts schema nodes into types of one graph.
///
/// `type_for_ref` outlives a single conversion so that top-levels sharing
/// `$ref`s share types. The refs a converter registers are journaled so that
/// [`Converter::rollback`] can forget them after a failure.
pub struct Converter<'a> {
    resolver: &'a mut Resolver,
    graph: &'a mut TypeGraph,
    producers: &'a [Box<dyn AttributeProducer>],
    type_for_ref: &'a mut HashMap<Ref, TypeRef>,
    registered: Vec<Ref>,
}

impl<'a> Converter<'a> {
    pub fn new(
        resolver: &'a mut Resolver,
        graph: &'a mut TypeGraph,
        producers: &'a [Box<dyn AttributeProducer>],
        type_for_ref: &'a mut HashMap<Ref, TypeRef>,
    ) -> Self {
        Self { resolver, graph, producers, type_for_ref, registered: Vec::new() }
    }

    /// Forget every ref registered by this converter. Their placeholders stay
    /// in the graph, unreachable from later conversions.
    pub fn rollback(self) {
        for reference in self.registered {
            self.type_for_ref.remove(&reference);
        }
    }
}

impl Converter<'_> {
    pub fn convert_top_level(&mut self, name: &str, reference: &Ref) -> Result<TypeRef, SchemaError> {
        let Resolved { document, location } = self.resolver.resolve_top_level_ref(reference)?;
        let schema = location.canonical_ref.lookup_ref(&document)?;
        self.to_type(schema, location, TypeAttributes::given_name(name))
    }

    fn to_type(&mut self, schema: &Value, loc: Location, attributes: TypeAttributes) -> Result<TypeRef, SchemaError> {
        if let Some(&t) = self.type_for_ref.get(&loc.canonical_ref) {
            return Ok(t);
        }
        let t = self.real_to_type(schema, &loc, attributes)?;
        self.set_type_for_location(&loc, t);
        Ok(t)
    }

    fn set_type_for_location(&mut self, loc: &Location, t: TypeRef) {
        if let Some(&existing) = self.type_for_ref.get(&loc.canonical_ref) {
            assert_eq!(existing, t, "{} converted to two different types", loc.canonical_ref);
            return;
        }
        self.type_for_ref.insert(loc.canonical_ref.clone(), t);
        self.registered.push(loc.canonical_ref.clone());
    }

    fn real_to_type(&mut self, schema: &Value, loc: &Location, mut attributes: TypeAttributes) -> Result<TypeRef, SchemaError> {
        let at = &loc.canonical_ref;
        let object = match SchemaNode::classify(schema) {
            Some(SchemaNode::Boolean(true)) => {
                return Ok(self.graph.get_primitive_type(PrimitiveKind::Any, TypeAttributes::empty()));
            }
            Some(SchemaNode::Boolean(false)) => return Err(SchemaError::FalseSchema { at: at.clone() }),
            Some(SchemaNode::Object(object)) => object,
            Some(SchemaNode::List(_)) | None => {
                return Err(SchemaError::NotASchema { at: at.clone(), actual: value_kind(schema) });
            }
        };
        let loc = match object.get("$id") {
            Some(id) => loc.update_with_id(id),
            None => loc.clone(),
        };
        if let Some(title) = object.get("title").and_then(Value::as_str) {
            attributes.combine(&TypeAttributes::given_name(title));
        }
        trace!(at = %loc.canonical_ref, "convert");
        self.convert_to_type(object, &loc, attributes)
    }

    fn produce(
        &self,
        schema: &Map<String, Value>,
        loc: &Location,
        included: &BTreeSet<JsonType>,
        cases: Option<&[Value]>,
    ) -> Vec<ProducedAttributes> {
        self.producers
            .iter()
            .filter_map(|p| p.produce(schema, &loc.canonical_ref, included, cases))
            .collect()
    }

    fn combine_produced(
        &self,
        schema: &Map<String, Value>,
        loc: &Location,
        included: &BTreeSet<JsonType>,
        pick: impl Fn(ProducedAttributes) -> Option<TypeAttributes>,
    ) -> TypeAttributes {
        let mut out = TypeAttributes::empty();
        for produced in self.produce(schema, loc, included, None) {
            if let Some(attrs) = pick(produced) {
                out.combine(&attrs);
            }
        }
        out
    }

    fn convert_to_type(
        &mut self,
        schema: &Map<String, Value>,
        loc: &Location,
        attributes: TypeAttributes,
    ) -> Result<TypeRef, SchemaError> {
        let at = &loc.canonical_ref;
        let enum_values = schema.get("enum").and_then(Value::as_array);
        let const_value = schema.get("const");
        let type_set = schema.get("type").map(|t| check_type_list(t, at)).transpose()?;
        let included: BTreeSet<JsonType> = JsonType::ALL
            .into_iter()
            .filter(|&t| is_type_included(t, type_set.as_ref(), enum_values, const_value))
            .collect();

        let mut attributes = attributes;
        if !schema.contains_key("oneOf") {
            attributes.combine(&self.combine_produced(schema, loc, &included, |p| {
                assert!(p.for_union.is_none() && p.for_cases.is_none(), "union attributes without a union");
                p.for_type
            }));
        }
        if attributes.names.is_empty() {
            attributes.combine(&TypeAttributes::inferred_name(at.name()));
        }
        let inferred = attributes.clone().make_inferred();
        let names_only = TypeAttributes { names: inferred.names.clone(), ..TypeAttributes::default() };

        let intersection = self.graph.get_unique_intersection_type(None, attributes.clone());
        self.set_type_for_location(loc, intersection);

        let structural = ["properties", "additionalProperties", "items", "required"];
        let need_union = type_set.is_some()
            || structural.iter().any(|k| schema.contains_key(*k))
            || enum_values.is_some()
            || const_value.is_some();
        let mut members = BTreeSet::new();

        if need_union {
            let mut union_members = BTreeSet::new();
            let number_attributes = self.combine_produced(schema, loc, &included, |p| p.for_number);
            let primitives = [
                (JsonType::Null, PrimitiveKind::Null),
                (JsonType::Boolean, PrimitiveKind::Bool),
                (JsonType::Integer, PrimitiveKind::Integer),
                (JsonType::Number, PrimitiveKind::Double),
            ];
            for (json_type, kind) in primitives {
                if !included.contains(&json_type) {
                    continue;
                }
                // Doubles already cover integers.
                if kind == PrimitiveKind::Integer && included.contains(&JsonType::Number) {
                    continue;
                }
                let attrs = if kind.is_number() { number_attributes.clone() } else { TypeAttributes::empty() };
                union_members.insert(self.graph.get_primitive_type(kind, attrs));
            }

            let string_attributes = self.combine_produced(schema, loc, &included, |p| p.for_string);
            let string_cases: Option<BTreeSet<String>> = match (const_value, enum_values) {
                (Some(Value::String(s)), _) => Some(BTreeSet::from([s.clone()])),
                (Some(_), _) => None,
                (None, Some(values)) if included.contains(&JsonType::String) => {
                    Some(values.iter().filter_map(Value::as_str).map(str::to_string).collect())
                }
                (None, _) => None,
            };
            if let Some(cases) = string_cases {
                let attrs = string_attributes.combined(&names_only);
                union_members.insert(self.graph.get_enum_type(cases, attrs));
            } else if included.contains(&JsonType::String) {
                union_members.insert(self.make_string_type(schema, string_attributes));
            }

            let unconstrained = enum_values.is_none() && const_value.is_none();
            let admits = |t: JsonType| unconstrained && type_set.as_ref().is_none_or(|set| set.contains(&t));
            if admits(JsonType::Array) {
                union_members.insert(self.make_array_type(schema, loc, &names_only)?);
            }
            if admits(JsonType::Object) {
                union_members.insert(self.make_object_type(schema, loc, &names_only)?);
            }
            members.insert(self.graph.get_unique_union_type(Some(union_members), inferred.clone()));
        }

        if let Some(reference) = schema.get("$ref") {
            let Value::String(reference) = reference else {
                return Err(SchemaError::RefNotString { at: at.clone() });
            };
            let Resolved { document, location } = self.resolver.resolve_virtual_ref(loc, &Ref::parse(reference))?;
            let target = location.canonical_ref.lookup_ref(&document)?;
            let ref_attributes = if attributes.names.given.is_empty() {
                TypeAttributes::inferred_name(location.canonical_ref.name())
            } else {
                TypeAttributes { names: attributes.names.clone(), ..TypeAttributes::default() }
            };
            members.insert(self.to_type(target, location, ref_attributes)?);
        }

        if let Some(cases) = schema.get("allOf") {
            members.extend(self.types_from_cases(cases, "allOf", loc, &names_only)?);
        }
        for kind in ["oneOf", "anyOf"] {
            if let Some(cases) = schema.get(kind) {
                let union = self.convert_one_or_any_of(schema, cases, kind, loc, &included, &inferred, intersection)?;
                members.insert(union);
            }
        }

        if members.is_empty() {
            members.insert(self.graph.get_primitive_type(PrimitiveKind::Any, TypeAttributes::empty()));
        }
        self.graph.set_set_operation_members(intersection, members);
        Ok(intersection)
    }

    fn make_string_type(&mut self, schema: &Map<String, Value>, attributes: TypeAttributes) -> TypeRef {
        let kind = schema
            .get("format")
            .and_then(Value::as_str)
            .and_then(StringFormat::from_schema_format)
            .map_or(PrimitiveKind::String, StringFormat::primitive);
        self.graph.get_primitive_type(kind, attributes)
    }

    fn make_array_type(
        &mut self,
        schema: &Map<String, Value>,
        loc: &Location,
        item_attributes: &TypeAttributes,
    ) -> Result<TypeRef, SchemaError> {
        let items_loc = loc.push("items");
        let item = match schema.get("items") {
            None => self.graph.get_primitive_type(PrimitiveKind::Any, TypeAttributes::empty()),
            Some(items) => match SchemaNode::classify(items) {
                Some(SchemaNode::List(tuple)) => {
                    let mut types = BTreeSet::new();
                    for (i, item) in tuple.iter().enumerate() {
                        types.insert(self.to_type(item, items_loc.push(&i.to_string()), item_attributes.clone())?);
                    }
                    if types.is_empty() {
                        self.graph.get_primitive_type(PrimitiveKind::Any, TypeAttributes::empty())
                    } else {
                        self.graph.get_union_type(types, TypeAttributes::empty())
                    }
                }
                Some(SchemaNode::Object(_) | SchemaNode::Boolean(_)) => {
                    self.to_type(items, items_loc, item_attributes.clone())?
                }
                None => return Err(SchemaError::InvalidItems { at: items_loc.canonical_ref }),
            },
        };
        Ok(self.graph.get_array_type(item, TypeAttributes::empty()))
    }

    fn make_object_type(
        &mut self,
        schema: &Map<String, Value>,
        loc: &Location,
        attributes: &TypeAttributes,
    ) -> Result<TypeRef, SchemaError> {
        let at = &loc.canonical_ref;
        let mut required: Vec<String> = match schema.get("required") {
            None | Some(Value::Bool(_)) => Vec::new(),
            Some(Value::Array(names)) => names
                .iter()
                .map(|n| n.as_str().map(str::to_string))
                .collect::<Option<_>>()
                .ok_or_else(|| SchemaError::RequiredNotStringArray { at: at.clone() })?,
            Some(_) => return Err(SchemaError::RequiredNotStringArray { at: at.clone() }),
        };
        let empty = Map::new();
        let properties = match schema.get("properties") {
            None => &empty,
            Some(Value::Object(properties)) => properties,
            Some(_) => return Err(SchemaError::PropertiesNotObject { at: at.clone() }),
        };
        // Draft 3 marks required properties in place.
        for (name, property) in properties {
            if property.get("required") == Some(&Value::Bool(true)) && !required.contains(name) {
                required.push(name.clone());
            }
        }

        let additional = match schema.get("additionalProperties") {
            Some(additional) => Some((additional, loc.push("additionalProperties"))),
            None => schema
                .get("patternProperties")
                .and_then(|p| p.get(".*"))
                .map(|additional| (additional, loc.push("patternProperties").push(".*"))),
        };
        self.make_object(loc, attributes, properties, &required, additional)
    }

    fn make_object(
        &mut self,
        loc: &Location,
        attributes: &TypeAttributes,
        properties: &Map<String, Value>,
        required: &[String],
        additional: Option<(&Value, Location)>,
    ) -> Result<TypeRef, SchemaError> {
        let properties_loc = loc.push("properties");
        let mut props: BTreeMap<String, ClassProperty> = BTreeMap::new();
        for (name, property) in properties {
            let t = self.to_type(property, properties_loc.push(name), TypeAttributes::inferred_name(name))?;
            let optional = !required.contains(name);
            props.insert(name.clone(), self.graph.make_class_property(t, optional));
        }

        let additional = match additional {
            None | Some((Value::Bool(true), _)) => {
                Some(self.graph.get_primitive_type(PrimitiveKind::Any, TypeAttributes::empty()))
            }
            Some((Value::Bool(false), _)) => None,
            Some((schema, additional_loc)) => Some(self.to_type(schema, additional_loc, attributes.clone())?),
        };

        let missing: Vec<String> = required.iter().filter(|n| !props.contains_key(*n)).cloned().collect();
        if !missing.is_empty() {
            let Some(t) = additional else {
                return Err(SchemaError::AdditionalForbidRequired { at: loc.canonical_ref.clone(), names: missing });
            };
            for name in missing {
                let property = self.graph.make_class_property(t, false);
                props.insert(name, property);
            }
        }
        Ok(self.graph.get_unique_object_type(props, additional, attributes.clone()))
    }

    fn types_from_cases(
        &mut self,
        cases: &Value,
        kind: &'static str,
        loc: &Location,
        attributes: &TypeAttributes,
    ) -> Result<Vec<TypeRef>, SchemaError> {
        let kind_loc = loc.push(kind);
        let Value::Array(cases) = cases else {
            return Err(SchemaError::CasesNotArray { at: kind_loc.canonical_ref, operation: kind });
        };
        let mut types = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            types.push(self.to_type(case, kind_loc.push(&i.to_string()), attributes.clone())?);
        }
        Ok(types)
    }

    #[allow(clippy::too_many_arguments)]
    fn convert_one_or_any_of(
        &mut self,
        schema: &Map<String, Value>,
        cases: &Value,
        kind: &'static str,
        loc: &Location,
        included: &BTreeSet<JsonType>,
        inferred: &TypeAttributes,
        intersection: TypeRef,
    ) -> Result<TypeRef, SchemaError> {
        let case_attributes = TypeAttributes { names: inferred.names.clone(), ..TypeAttributes::default() };
        let types = self.types_from_cases(cases, kind, loc, &case_attributes)?;
        let mut union_attributes = inferred.clone();
        if kind == "oneOf" {
            let case_values = cases.as_array().map(Vec::as_slice);
            for produced in self.produce(schema, loc, included, case_values) {
                if let Some(for_type) = produced.for_type {
                    self.graph.add_attributes(intersection, &for_type);
                }
                if let Some(for_union) = produced.for_union {
                    union_attributes.combine(&for_union);
                }
                if let Some(for_cases) = produced.for_cases {
                    assert_eq!(for_cases.len(), types.len(), "one attribute set per case");
                    for (t, attrs) in types.iter().zip(&for_cases) {
                        self.graph.add_attributes(*t, attrs);
                    }
                }
            }
        }
        let union = self.graph.get_unique_union_type(None, union_attributes);
        self.graph.set_set_operation_members(union, types.into_iter().collect());
        Ok(union)
    }
}

fn check_type_list(value: &Value, at: &Ref) -> Result<BTreeSet<JsonType>, SchemaError> {
    let names: Vec<&str> = match value {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names
            .iter()
            .map(Value::as_str)
            .collect::<Option<_>>()
            .ok_or_else(|| SchemaError::InvalidTypeList { at: at.clone() })?,
        _ => return Err(SchemaError::InvalidTypeList { at: at.clone() }),
    };
    names
        .into_iter()
        .map(|name| {
            JsonType::from_name(name).ok_or_else(|| SchemaError::UnknownTypeName { at: at.clone(), name: name.to_string() })
        })
        .collect()
}

fn is_type_included(
    t: JsonType,
    type_set: Option<&BTreeSet<JsonType>>,
    enum_values: Option<&Vec<Value>>,
    const_value: Option<&Value>,
) -> bool {
    if type_set.is_some_and(|set| !set.contains(&t)) {
        return false;
    }
    if let Some(values) = enum_values {
        return values.iter().any(|v| t.admits(v));
    }
    if let Some(value) = const_value {
        return match type_set {
            Some(_) => t.admits(value),
            None => t == JsonType::of_value(value),
        };
    }
    true
}
