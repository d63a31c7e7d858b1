use thiserror::Error;

use crate::schema::Ref;

/// Malformed schemas and failed reference resolution.
///
/// Every variant names the location it was raised at so the user can find the
/// offending node. Processing of the current schema source stops at the first
/// error.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{at}: a schema must be an object or a boolean, found {actual}")]
    NotASchema { at: Ref, actual: &'static str },
    #[error("{at}: `false` schemas are not supported")]
    FalseSchema { at: Ref },
    #[error("{at}: `type` must be a string or an array of strings")]
    InvalidTypeList { at: Ref },
    #[error("{at}: unknown type name `{name}`")]
    UnknownTypeName { at: Ref, name: String },
    #[error("{at}: `required` must be an array of strings")]
    RequiredNotStringArray { at: Ref },
    #[error("{at}: `properties` must be an object")]
    PropertiesNotObject { at: Ref },
    #[error("{at}: array `items` must be a schema object, an array or a boolean")]
    InvalidItems { at: Ref },
    #[error("{at}: `{operation}` cases must be an array")]
    CasesNotArray { at: Ref, operation: &'static str },
    #[error("{at}: `$ref` must be a string")]
    RefNotString { at: Ref },
    #[error("{at}: properties {names:?} are required but `additionalProperties` is false")]
    AdditionalForbidRequired { at: Ref, names: Vec<String> },
    #[error("{at}: key `{key}` not found")]
    MissingKey { at: Ref, key: String },
    #[error("{at}: `{index}` is not an array index")]
    IndexNotNumeric { at: Ref, index: String },
    #[error("{at}: index {index} out of range for array of length {len}")]
    IndexOutOfRange { at: Ref, index: usize, len: usize },
    #[error("{at}: cannot look up `{key}` in a {kind}")]
    NotAContainer { at: Ref, key: String, kind: &'static str },
    #[error("could not resolve `{target}` from `{base}`")]
    RefNotFound { base: Ref, target: Ref },
    #[error("reference `{target}` has no address to fetch")]
    NoAddress { target: Ref },
    #[error("no schema store configured, cannot fetch `{address}`")]
    NoSchemaStore { address: String },
    #[error("invalid schema source `{name}`: {message}")]
    InvalidSource { name: String, message: String },
}

impl SchemaError {
    /// Fatal errors abort the whole batch instead of the current source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchemaError::NoSchemaStore { .. })
    }
}

/// Failures of the document fetch capability.
///
/// These never escape the resolver: a document that fails to load is logged
/// and treated as absent.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read `{address}`: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{address}` is not valid JSON: {source}")]
    Parse {
        address: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to parse JSON sample: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no samples given for `{name}`")]
    NoSamples { name: String },
    #[error("reference `{reference}` is not rooted at `#/`")]
    RefNotRooted { reference: String },
    #[error("reference `{reference}` goes through a union that is not nullable")]
    RefIntoUnion { reference: String },
    #[error("reference `{reference}`: property `{property}` does not exist")]
    RefMissingProperty { reference: String, property: String },
    #[error("reference `{reference}`: `{segment}` is not an array index")]
    RefBadIndex { reference: String, segment: String },
    #[error("reference `{reference}` walks through itself")]
    RefCycle { reference: String },
    #[error("reference `{reference}` goes into a non-composite {kind} type")]
    RefIntoNonComposite { reference: String, kind: &'static str },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("top-level `{0}` is already defined")]
    DuplicateTopLevel(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
