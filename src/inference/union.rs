use std::collections::{BTreeMap, BTreeSet};

use crate::attributes::TypeAttributes;
use crate::config::InferenceConfig;
use crate::inference::store::{Tag, Tagged, ValueStore};
use crate::inference::str::StringFormat;
use crate::ir::PrimitiveKind;

/// Sufficient statistics for every value sampled at one position.
///
/// Only sets and counts are kept, so the result of [`UnionAccumulator::build`]
/// depends on the multiset of values added and never on their order.
/// Objects and arrays are kept as handles and unified later by the driver.
#[derive(Debug, Default)]
pub struct UnionAccumulator {
    null: bool,
    boolean: bool,
    integer: bool,
    double: bool,
    /// Interned string literals and how often each was seen.
    string_cases: BTreeMap<String, usize>,
    string_samples: usize,
    /// An uninterned string was seen; literal cases are meaningless.
    unrestricted_string: bool,
    formats: BTreeMap<StringFormat, TypeAttributes>,
    objects: Vec<Tagged>,
    arrays: Vec<Tagged>,
}

/// The shape merged from one position's samples.
#[derive(Debug, Default, PartialEq)]
pub struct UnifiedType {
    pub primitives: BTreeSet<PrimitiveKind>,
    /// Attributes produced for transformed-string members.
    pub primitive_attributes: BTreeMap<PrimitiveKind, TypeAttributes>,
    pub enum_cases: Option<BTreeSet<String>>,
    pub objects: Vec<Tagged>,
    pub arrays: Vec<Tagged>,
}

impl UnifiedType {
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
            && self.enum_cases.is_none()
            && self.objects.is_empty()
            && self.arrays.is_empty()
    }
}

impl UnionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, store: &ValueStore, value: Tagged) {
        match value.tag() {
            Tag::Null => self.null = true,
            Tag::False | Tag::True => self.boolean = true,
            Tag::Integer => self.integer = true,
            Tag::Double => self.double = true,
            Tag::InternedString => {
                self.string_samples += 1;
                *self.string_cases.entry(store.string_value(value).to_string()).or_default() += 1;
            }
            Tag::UninternedString => self.unrestricted_string = true,
            Tag::StringFormat | Tag::TransformedString => match store.string_format(value) {
                Some(format) => {
                    let produced = if value.tag() == Tag::TransformedString {
                        format.produce_attributes(store.string_value(value))
                    } else {
                        TypeAttributes::default()
                    };
                    self.formats.entry(format).or_default().combine(&produced);
                }
                None => self.unrestricted_string = true,
            },
            Tag::Object => self.objects.push(value),
            Tag::Array => self.arrays.push(value),
        }
    }

    pub fn add_all(&mut self, store: &ValueStore, values: &[Tagged]) {
        for &v in values {
            self.add(store, v);
        }
    }

    pub fn build(self, config: &InferenceConfig) -> UnifiedType {
        let mut out = UnifiedType {
            objects: self.objects,
            arrays: self.arrays,
            ..UnifiedType::default()
        };

        if self.null {
            out.primitives.insert(PrimitiveKind::Null);
        }
        if self.boolean {
            out.primitives.insert(PrimitiveKind::Bool);
        }
        // Integers are doubles too; a position with both is a double.
        if self.double {
            out.primitives.insert(PrimitiveKind::Double);
        } else if self.integer {
            out.primitives.insert(PrimitiveKind::Integer);
        }

        let saw_literals = self.string_samples > 0;
        let single_format = self.formats.len() == 1 && !saw_literals && !self.unrestricted_string;
        if single_format {
            let (format, attributes) = self.formats.into_iter().next().expect("one format");
            if !attributes.is_empty() {
                out.primitive_attributes.insert(format.primitive(), attributes);
            }
            out.primitives.insert(format.primitive());
        } else if self.unrestricted_string || !self.formats.is_empty() {
            out.primitives.insert(PrimitiveKind::String);
        } else if saw_literals {
            if is_enum(self.string_cases.len(), self.string_samples, config) {
                out.enum_cases = Some(self.string_cases.into_keys().collect());
            } else {
                out.primitives.insert(PrimitiveKind::String);
            }
        }
        out
    }
}

/// Few distinct cases over many samples look like an enum.
fn is_enum(cases: usize, samples: usize, config: &InferenceConfig) -> bool {
    config.infer_enums && samples >= config.min_enum_samples && (cases as f64) < (samples as f64).sqrt()
}
