use std::collections::{BTreeMap, BTreeSet};

use crate::config::InferenceConfig;
use crate::inference::store::{Tag, Tagged, ValueStore};

/// Per-property evidence gathered across the object instances at one position.
#[derive(Debug, Default)]
pub struct PropertySamples {
    pub values: Vec<Tagged>,
    /// How many instances had this key.
    pub present_in: usize,
    last_instance: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ObjectShape<'s> {
    pub instances: usize,
    pub properties: BTreeMap<&'s str, PropertySamples>,
}

impl<'s> ObjectShape<'s> {
    pub fn collect(store: &'s ValueStore, objects: &[Tagged]) -> Self {
        let mut shape = ObjectShape { instances: objects.len(), ..Self::default() };
        for (instance, &object) in objects.iter().enumerate() {
            for (key, value) in store.object_members(object) {
                let samples = shape.properties.entry(key).or_default();
                samples.values.push(value);
                if samples.last_instance != Some(instance) {
                    samples.last_instance = Some(instance);
                    samples.present_in += 1;
                }
            }
        }
        shape
    }

    /// Too many distinct keys to be a fixed record.
    pub fn is_map(&self, config: &InferenceConfig) -> bool {
        config.infer_maps && self.properties.len() > config.map_threshold
    }

    pub fn is_optional(&self, samples: &PropertySamples) -> bool {
        samples.present_in < self.instances
    }

    /// Every property value of every instance, for map inference.
    pub fn all_values(&self) -> Vec<Tagged> {
        self.properties.values().flat_map(|p| p.values.iter().copied()).collect()
    }

    /// When every instance is exactly `{"$ref": "<string>"}`, the referenced
    /// targets.
    pub fn ref_targets(&self, store: &ValueStore, objects: &[Tagged]) -> Option<BTreeSet<String>> {
        if self.properties.len() != 1 || !self.properties.contains_key("$ref") {
            return None;
        }
        let mut targets = BTreeSet::new();
        for &object in objects {
            if store.object_len(object) != 1 {
                return None;
            }
            let (_, value) = store.object_members(object).next()?;
            if value.tag() != Tag::InternedString {
                return None;
            }
            targets.insert(store.string_value(value).to_string());
        }
        Some(targets)
    }
}
