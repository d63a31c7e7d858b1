//! Attribute producers: schema keywords that annotate types without changing
//! their shape.
use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde_json::{Map, Value};

use crate::attributes::{LengthRange, MinMax, TypeAttributes};
use crate::schema::convert::JsonType;
use crate::schema::reference::Ref;

/// What one producer contributes for one schema node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducedAttributes {
    /// For the type of the node itself.
    pub for_type: Option<TypeAttributes>,
    /// For the union built from `oneOf`.
    pub for_union: Option<TypeAttributes>,
    /// One entry per `oneOf` case, in order.
    pub for_cases: Option<Vec<TypeAttributes>>,
    pub for_string: Option<TypeAttributes>,
    pub for_number: Option<TypeAttributes>,
}

pub trait AttributeProducer {
    /// `cases` is given only when producing for a `oneOf`; union and case
    /// attributes must be left empty otherwise.
    fn produce(
        &self,
        schema: &Map<String, Value>,
        at: &Ref,
        types: &BTreeSet<JsonType>,
        cases: Option<&[Value]>,
    ) -> Option<ProducedAttributes>;
}

pub fn builtin_producers() -> Vec<Box<dyn AttributeProducer>> {
    vec![Box::new(DescriptionProducer), Box::new(MinMaxProducer), Box::new(StringConstraintProducer)]
}

fn description(schema: &Map<String, Value>) -> Option<TypeAttributes> {
    let description = schema.get("description")?.as_str()?;
    Some(TypeAttributes { description: Some(description.to_string()), ..TypeAttributes::default() })
}

pub struct DescriptionProducer;

impl AttributeProducer for DescriptionProducer {
    fn produce(
        &self,
        schema: &Map<String, Value>,
        _at: &Ref,
        _types: &BTreeSet<JsonType>,
        cases: Option<&[Value]>,
    ) -> Option<ProducedAttributes> {
        let for_cases = cases.and_then(|cases| {
            let described: Vec<TypeAttributes> = cases
                .iter()
                .map(|case| case.as_object().and_then(description).unwrap_or_default())
                .collect();
            described.iter().any(|a| !a.is_empty()).then_some(described)
        });
        let for_type = description(schema);
        if for_type.is_none() && for_cases.is_none() {
            return None;
        }
        Some(ProducedAttributes { for_type, for_cases, ..ProducedAttributes::default() })
    }
}

pub struct MinMaxProducer;

impl AttributeProducer for MinMaxProducer {
    fn produce(
        &self,
        schema: &Map<String, Value>,
        _at: &Ref,
        types: &BTreeSet<JsonType>,
        _cases: Option<&[Value]>,
    ) -> Option<ProducedAttributes> {
        if !types.contains(&JsonType::Number) && !types.contains(&JsonType::Integer) {
            return None;
        }
        let bound = |key: &str| schema.get(key).and_then(Value::as_f64).map(OrderedFloat);
        let min_max = MinMax { minimum: bound("minimum"), maximum: bound("maximum") };
        if min_max == MinMax::default() {
            return None;
        }
        Some(ProducedAttributes {
            for_number: Some(TypeAttributes { min_max: Some(min_max), ..TypeAttributes::default() }),
            ..ProducedAttributes::default()
        })
    }
}

pub struct StringConstraintProducer;

impl AttributeProducer for StringConstraintProducer {
    fn produce(
        &self,
        schema: &Map<String, Value>,
        _at: &Ref,
        types: &BTreeSet<JsonType>,
        _cases: Option<&[Value]>,
    ) -> Option<ProducedAttributes> {
        if !types.contains(&JsonType::String) {
            return None;
        }
        let length = LengthRange {
            min_length: schema.get("minLength").and_then(Value::as_u64),
            max_length: schema.get("maxLength").and_then(Value::as_u64),
        };
        let attrs = TypeAttributes {
            length: (length != LengthRange::default()).then_some(length),
            pattern: schema.get("pattern").and_then(Value::as_str).map(str::to_string),
            ..TypeAttributes::default()
        };
        if attrs.is_empty() {
            return None;
        }
        Some(ProducedAttributes { for_string: Some(attrs), ..ProducedAttributes::default() })
    }
}
