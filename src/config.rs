use serde::Deserialize;

/// Objects with more distinct keys than this unify to a map.
pub const DEFAULT_MAP_THRESHOLD: usize = 500;

/// Strings longer than this (in UTF-16 code units) are not interned.
pub const DEFAULT_INTERN_MAX_LEN: usize = 64;

/// Fewer string samples than this never become an enum.
pub const DEFAULT_MIN_ENUM_SAMPLES: usize = 10;

/// Knobs for sample-based inference.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct InferenceConfig {
    pub map_threshold: usize,
    pub intern_max_len: usize,
    pub infer_maps: bool,
    pub infer_enums: bool,
    pub min_enum_samples: usize,
    pub infer_string_formats: bool,
    /// Treat `{"$ref": "#/..."}` objects in samples as references.
    pub handle_refs: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            map_threshold: DEFAULT_MAP_THRESHOLD,
            intern_max_len: DEFAULT_INTERN_MAX_LEN,
            infer_maps: true,
            infer_enums: true,
            min_enum_samples: DEFAULT_MIN_ENUM_SAMPLES,
            infer_string_formats: true,
            handle_refs: false,
        }
    }
}

impl InferenceConfig {
    pub fn with_refs(mut self) -> Self {
        self.handle_refs = true;
        self
    }
}
