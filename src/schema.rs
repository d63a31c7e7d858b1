//! JSON Schema input.
//!
//! Sources are registered up front with [`JsonSchemaInput::add_source`] and
//! converted in one batch by [`JsonSchemaInput::add_types`]. Each top-level
//! reference is converted to completion before the next one starts, and all
//! of them share one resolver, so documents are fetched once per batch.
pub mod canonizer;
pub mod convert;
pub mod location;
pub mod producers;
pub mod reference;
pub mod resolver;
pub mod store;

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

pub use convert::JsonType;
pub use location::Location;
pub use producers::{AttributeProducer, ProducedAttributes};
pub use reference::{PathElement, Ref};
pub use resolver::Resolver;
pub use store::{FileStore, InMemoryStore, SchemaStore};

use crate::error::{Error, SchemaError};
use crate::graph::TypeGraph;
use crate::ir::TypeRef;
use convert::Converter;

/// One schema input: inline text, addresses to fetch, or both.
///
/// With inline text, the document is served under the first URI's address, or
/// under `name` when there are no URIs.
#[derive(Debug, Clone, Default)]
pub struct SchemaSource {
    pub name: Option<String>,
    pub uris: Vec<String>,
    pub schema: Option<String>,
}

/// Outcome of a batch. Failed sources do not stop the others.
#[derive(Debug, Default)]
pub struct SchemaReport {
    pub converted: Vec<(String, TypeRef)>,
    pub failed: Vec<(String, Error)>,
}

impl SchemaReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct JsonSchemaInput {
    resolver: Resolver,
    producers: Vec<Box<dyn AttributeProducer>>,
    type_for_ref: HashMap<Ref, TypeRef>,
    top_levels: IndexMap<String, Ref>,
}

impl JsonSchemaInput {
    /// Without a store, only inline sources can be resolved; any other fetch
    /// is fatal.
    pub fn new(store: Option<Box<dyn SchemaStore>>) -> Self {
        Self {
            resolver: Resolver::new(store),
            producers: producers::builtin_producers(),
            type_for_ref: HashMap::new(),
            top_levels: IndexMap::new(),
        }
    }

    pub fn add_producer(&mut self, producer: Box<dyn AttributeProducer>) {
        self.producers.push(producer);
    }

    pub fn add_source(&mut self, source: SchemaSource) -> Result<(), SchemaError> {
        let SchemaSource { name, uris, schema } = source;
        let label = name.clone().or_else(|| uris.first().cloned()).unwrap_or_default();
        let invalid = |message: String| SchemaError::InvalidSource { name: label.clone(), message };

        let uris = match (uris.is_empty(), &name) {
            (false, _) => uris,
            (true, Some(name)) => vec![format!("{name}#/")],
            (true, None) => return Err(invalid("a source needs a name or at least one URI".into())),
        };

        let mut document_root = None;
        if let Some(text) = schema {
            let document: Value = crate::path_de::from_str_with_path(&text).map_err(|e| invalid(e.to_string()))?;
            let address = Ref::parse(&uris[0])
                .address()
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("`{}` has no address to store the schema under", uris[0])))?;
            self.resolver.add_document(&address, document);
            document_root = Some(Ref::root(Some(address)));
        }

        let single = uris.len() == 1;
        for uri in &uris {
            let mut reference = Ref::parse(uri);
            if let Some(root) = &document_root {
                reference = reference.resolve_against(root);
            }
            let top_name = match &name {
                Some(name) if single => name.clone(),
                _ => reference.name(),
            };
            if self.top_levels.contains_key(&top_name) {
                return Err(invalid(format!("top-level `{top_name}` is defined twice")));
            }
            debug!(name = %top_name, reference = %reference, "added top-level");
            self.top_levels.insert(top_name, reference);
        }
        Ok(())
    }

    /// Convert every top-level added since the last call into `graph`.
    ///
    /// Returns `Err` only for fatal errors; everything else is recorded in the
    /// report.
    pub fn add_types(&mut self, graph: &mut TypeGraph) -> Result<SchemaReport, Error> {
        let mut report = SchemaReport::default();
        for (name, reference) in std::mem::take(&mut self.top_levels) {
            debug!(%name, %reference, "converting top-level");
            let mut converter =
                Converter::new(&mut self.resolver, &mut *graph, &self.producers, &mut self.type_for_ref);
            let converted = match converter.convert_top_level(&name, &reference) {
                Ok(t) => t,
                Err(error) if error.is_fatal() => return Err(error.into()),
                Err(error) => {
                    // Later sources must not pick up this source's empty placeholders.
                    converter.rollback();
                    warn!(%name, %error, "schema conversion failed");
                    report.failed.push((name, error.into()));
                    continue;
                }
            };
            match graph.add_top_level(&name, converted) {
                Ok(()) => report.converted.push((name, converted)),
                Err(error) => report.failed.push((name, error.into())),
            }
        }
        Ok(report)
    }
}
