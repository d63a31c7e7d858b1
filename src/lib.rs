//! Type inference front end for JSON.
//!
//! Two inputs produce types in one [`TypeGraph`]:
//!
//! - sampled JSON values, unified by [`Inference`];
//! - JSON Schema documents, converted by [`JsonSchemaInput`].
//!
//! ```
//! use json_typegraph::{Inference, InferenceConfig, JsonSchemaInput, SchemaSource, TypeGraph};
//!
//! let mut graph = TypeGraph::new();
//!
//! let mut samples = Inference::new(InferenceConfig::default());
//! samples.observe_str(r#"{"id": 1, "tags": ["a"]}"#).unwrap();
//! samples.solve(&mut graph, "Sampled").unwrap();
//!
//! let mut schemas = JsonSchemaInput::new(None);
//! schemas
//!     .add_source(SchemaSource {
//!         name: Some("Declared".into()),
//!         schema: Some(r#"{"type": ["string", "null"]}"#.into()),
//!         ..SchemaSource::default()
//!     })
//!     .unwrap();
//! schemas.add_types(&mut graph).unwrap();
//!
//! assert_eq!(graph.top_levels().len(), 2);
//! ```
pub mod attributes;
pub mod config;
pub mod error;
pub mod graph;
pub mod inference;
pub mod ir;
pub mod path_de;
pub mod schema;

pub use attributes::{TypeAttributes, TypeNames};
pub use config::InferenceConfig;
pub use error::{Error, FetchError, GraphError, InferenceError, Result, SchemaError};
pub use graph::TypeGraph;
pub use inference::Inference;
pub use ir::{ClassProperty, PrimitiveKind, TypeKind, TypeRef};
pub use schema::{FileStore, InMemoryStore, JsonSchemaInput, Ref, SchemaReport, SchemaSource, SchemaStore};
