//! Type attributes: side information attached to graph types.
//!
//! Attributes never take part in a type's identity. Combining two attribute
//! sets is always a union: name sets merge, numeric and length ranges widen,
//! and scalar annotations that disagree are dropped for good. An absent
//! attribute is neutral and never erases the other side.

use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeNames {
    /// Names supplied by the user (top-level names, schema titles).
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub given: BTreeSet<String>,
    /// Names derived from property keys and ref targets.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub inferred: BTreeSet<String>,
}

impl TypeNames {
    pub fn is_empty(&self) -> bool {
        self.given.is_empty() && self.inferred.is_empty()
    }

    /// Given names win over inferred ones.
    pub fn preferred(&self) -> Option<&str> {
        self.given
            .iter()
            .next()
            .or_else(|| self.inferred.iter().next())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MinMax {
    pub minimum: Option<OrderedFloat<f64>>,
    pub maximum: Option<OrderedFloat<f64>>,
}

impl MinMax {
    fn widen(self, other: MinMax) -> MinMax {
        MinMax {
            minimum: self.minimum.zip(other.minimum).map(|(a, b)| a.min(b)),
            maximum: self.maximum.zip(other.maximum).map(|(a, b)| a.max(b)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LengthRange {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

impl LengthRange {
    fn widen(self, other: LengthRange) -> LengthRange {
        LengthRange {
            min_length: self.min_length.zip(other.min_length).map(|(a, b)| a.min(b)),
            max_length: self.max_length.zip(other.max_length).map(|(a, b)| a.max(b)),
        }
    }
}

/// What sampled URIs looked like.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UriAttributes {
    pub schemes: BTreeSet<String>,
    pub extensions: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateTimeAttributes {
    /// Every sample carried an explicit UTC offset (`Z` or `+hh:mm`).
    pub always_offset: bool,
}

/// Scalar annotations that already met a disagreement.
///
/// A conflict is remembered so that combining stays order independent:
/// once two descriptions differ, no later sample brings one back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Conflicts {
    pub description: bool,
    pub pattern: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeAttributes {
    #[serde(skip_serializing_if = "TypeNames::is_empty")]
    pub names: TypeNames,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_max: Option<MinMax>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<LengthRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<UriAttributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTimeAttributes>,
    #[serde(skip)]
    pub conflicts: Conflicts,
}

impl TypeAttributes {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn given_name(name: impl Into<String>) -> Self {
        let mut attrs = Self::default();
        attrs.names.given.insert(name.into());
        attrs
    }

    pub fn inferred_name(name: impl Into<String>) -> Self {
        let mut attrs = Self::default();
        attrs.names.inferred.insert(name.into());
        attrs
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Demote every given name to an inferred one.
    pub fn make_inferred(mut self) -> Self {
        let given = std::mem::take(&mut self.names.given);
        self.names.inferred.extend(given);
        self
    }

    pub fn combine(&mut self, other: &TypeAttributes) {
        self.names.given.extend(other.names.given.iter().cloned());
        self.names.inferred.extend(other.names.inferred.iter().cloned());
        agree(&mut self.description, &mut self.conflicts.description, &other.description, other.conflicts.description);
        agree(&mut self.pattern, &mut self.conflicts.pattern, &other.pattern, other.conflicts.pattern);
        self.min_max = merge_with(self.min_max, other.min_max, MinMax::widen);
        self.length = merge_with(self.length, other.length, LengthRange::widen);
        self.uri = match (self.uri.take(), &other.uri) {
            (Some(mut a), Some(b)) => {
                a.schemes.extend(b.schemes.iter().cloned());
                a.extensions.extend(b.extensions.iter().cloned());
                Some(a)
            }
            (a, b) => a.or_else(|| b.clone()),
        };
        self.date_time = merge_with(self.date_time, other.date_time, |a, b| DateTimeAttributes {
            always_offset: a.always_offset && b.always_offset,
        });
    }

    pub fn combined(mut self, other: &TypeAttributes) -> Self {
        self.combine(other);
        self
    }
}

fn agree(value: &mut Option<String>, conflicted: &mut bool, other: &Option<String>, other_conflicted: bool) {
    *conflicted |= other_conflicted;
    match (value.as_ref(), other) {
        _ if *conflicted => *value = None,
        (Some(a), Some(b)) if a != b => {
            *value = None;
            *conflicted = true;
        }
        (None, Some(b)) => *value = Some(b.clone()),
        _ => {}
    }
}

fn merge_with<T>(a: Option<T>, b: Option<T>, f: impl FnOnce(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_merge_and_given_wins() {
        let mut a = TypeAttributes::inferred_name("address");
        a.combine(&TypeAttributes::given_name("Address"));
        assert_eq!(a.names.preferred(), Some("Address"));
        assert!(a.names.inferred.contains("address"));
    }

    #[test]
    fn ranges_widen_and_absent_is_neutral() {
        let mut a = TypeAttributes {
            min_max: Some(MinMax { minimum: Some(OrderedFloat(1.0)), maximum: Some(OrderedFloat(3.0)) }),
            ..TypeAttributes::default()
        };
        let b = TypeAttributes {
            min_max: Some(MinMax { minimum: Some(OrderedFloat(0.0)), maximum: None }),
            ..TypeAttributes::default()
        };
        a.combine(&TypeAttributes::default());
        assert_eq!(a.min_max.unwrap().maximum, Some(OrderedFloat(3.0)));
        a.combine(&b);
        let mm = a.min_max.unwrap();
        assert_eq!(mm.minimum, Some(OrderedFloat(0.0)));
        assert_eq!(mm.maximum, None);
    }

    #[test]
    fn conflicting_descriptions_drop() {
        let mut a = TypeAttributes { description: Some("x".into()), ..TypeAttributes::default() };
        a.combine(&TypeAttributes { description: Some("x".into()), ..TypeAttributes::default() });
        assert_eq!(a.description.as_deref(), Some("x"));
        a.combine(&TypeAttributes { description: Some("y".into()), ..TypeAttributes::default() });
        assert_eq!(a.description, None);
    }

    #[test]
    fn conflicts_stick_regardless_of_order() {
        let described = |d: &str| TypeAttributes { pattern: Some(d.into()), ..TypeAttributes::default() };
        let fold = |order: [&str; 3]| {
            order.into_iter().fold(TypeAttributes::default(), |acc, d| acc.combined(&described(d)))
        };
        for order in [["x", "x", "y"], ["x", "y", "x"], ["y", "x", "x"]] {
            let folded = fold(order);
            assert_eq!(folded.pattern, None, "{order:?}");
            assert!(folded.conflicts.pattern);
        }

        let mut grouped = described("x").combined(&described("y"));
        grouped.combine(&TypeAttributes::default());
        assert_eq!(described("x").combined(&grouped).pattern, None);
    }

    #[test]
    fn date_time_offsets_and() {
        let mut a = TypeAttributes {
            date_time: Some(DateTimeAttributes { always_offset: true }),
            ..TypeAttributes::default()
        };
        a.combine(&TypeAttributes {
            date_time: Some(DateTimeAttributes { always_offset: false }),
            ..TypeAttributes::default()
        });
        assert!(!a.date_time.unwrap().always_offset);
    }
}
