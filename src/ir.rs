//! Type graph IR shared by sample inference and schema conversion.
//! No `serde_json::Value` here.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// Handle to a type stored in a [`crate::graph::TypeGraph`].
///
/// Only meaningful for the graph that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TypeRef(pub(crate) u32);

impl TypeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrimitiveKind {
    None,
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Date,
    Time,
    DateTime,
    Uuid,
    Uri,
    IntegerString,
    BoolString,
}

impl PrimitiveKind {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::None => "none",
            PrimitiveKind::Any => "any",
            PrimitiveKind::Null => "null",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Time => "time",
            PrimitiveKind::DateTime => "date-time",
            PrimitiveKind::Uuid => "uuid",
            PrimitiveKind::Uri => "uri",
            PrimitiveKind::IntegerString => "integer-string",
            PrimitiveKind::BoolString => "bool-string",
        }
    }

    pub fn is_number(self) -> bool {
        matches!(self, PrimitiveKind::Integer | PrimitiveKind::Double)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassProperty {
    #[serde(rename = "type")]
    pub ty: TypeRef,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TypeKind {
    Primitive { primitive: PrimitiveKind },
    Enum { cases: BTreeSet<String> },
    Array { items: TypeRef },
    Class { properties: BTreeMap<String, ClassProperty> },
    /// Object with fixed properties plus an optional additional-property type.
    Object {
        properties: BTreeMap<String, ClassProperty>,
        additional: Option<TypeRef>,
    },
    Map { values: TypeRef },
    /// Members are `None` until [`crate::graph::TypeGraph::set_set_operation_members`] runs.
    Union { members: Option<BTreeSet<TypeRef>> },
    Intersection { members: Option<BTreeSet<TypeRef>> },
}

impl TypeKind {
    pub fn name(&self) -> &'static str {
        match self {
            TypeKind::Primitive { primitive } => primitive.name(),
            TypeKind::Enum { .. } => "enum",
            TypeKind::Array { .. } => "array",
            TypeKind::Class { .. } => "class",
            TypeKind::Object { .. } => "object",
            TypeKind::Map { .. } => "map",
            TypeKind::Union { .. } => "union",
            TypeKind::Intersection { .. } => "intersection",
        }
    }
}
