//! Minimal CLI: samples | schema → type graph JSON
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use json_typegraph::{
    FileStore, Inference, InferenceConfig, JsonSchemaInput, SchemaSource, TypeGraph,
};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// infer types from JSON samples or JSON Schema and print the resulting type graph
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// infer types from sampled JSON/NDJSON documents
    Samples(SamplesCmd),
    /// convert JSON Schema documents into types
    Schema(SchemaCmd),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct SamplesCmd {
    #[command(flatten)]
    input_settings: InputSettings,

    /// inference settings (.json); unspecified keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// treat `{"$ref": "#/..."}` objects as references into the sampled type
    #[arg(long, default_value_t = false)]
    handle_refs: bool,

    /// top-level type name
    #[arg(long, default_value = "Root")]
    name: String,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct SchemaCmd {
    /// schema files, quoted glob patterns or URIs (`file:///...`, `schema.json#/definitions/A`)
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// top-level type name; only valid with a single input
    #[arg(long)]
    name: Option<String>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

/// One input file, read but not yet observed.
enum LoadedFile {
    /// Raw text, decoded straight into the value store.
    Text { path: PathBuf, source: String },
    /// Nodes picked out by `--json-pointer`.
    Selected(Vec<Value>),
}

impl InputSettings {
    /// Read every input in parallel, then observe documents in input order.
    ///
    /// Without a JSON Pointer no `Value` tree is built; documents are decoded
    /// directly into the inference's value store.
    fn observe_all(&self, inference: &mut Inference) -> anyhow::Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .map_err(|error| anyhow!("failed to resolve input file paths: {error}"))?;
        let loaded = source_paths
            .par_iter()
            .map(|path| self.load_file(path))
            .collect::<anyhow::Result<Vec<_>>>()?;
        for file in loaded {
            match file {
                LoadedFile::Text { path, source } => self.observe_text(inference, &path, &source)?,
                LoadedFile::Selected(nodes) => {
                    for node in &nodes {
                        inference.observe_value(node)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn observe_text(&self, inference: &mut Inference, path: &Path, source: &str) -> anyhow::Result<()> {
        if !self.ndjson {
            return inference
                .observe_str(source)
                .with_context(|| format!("failed to parse JSON source file ({})", path.display()));
        }
        for (i, line) in source.lines().enumerate().filter(|(_, line)| !line.trim().is_empty()) {
            inference
                .observe_str(line)
                .with_context(|| format!("failed to parse NDJSON line {} ({})", i + 1, path.display()))?;
        }
        Ok(())
    }

    fn load_file(&self, source_path: &Path) -> anyhow::Result<LoadedFile> {
        let source_path_str = source_path.to_string_lossy();
        let source = std::fs::read_to_string(source_path)
            .with_context(|| format!("failed to read source file ({source_path_str})"))?;
        let Some(pointer) = self.json_pointer.as_deref() else {
            return Ok(LoadedFile::Text { path: source_path.to_path_buf(), source });
        };
        let documents = if self.ndjson {
            source
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    serde_json::from_str::<Value>(line).with_context(|| {
                        format!("failed to parse NDJSON line {} ({source_path_str})", i + 1)
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?
        } else {
            let value = serde_json::from_str::<Value>(&source)
                .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
            vec![value]
        };
        let selected: Vec<Value> = documents
            .into_iter()
            .filter_map(|mut document| {
                let node = document.pointer_mut(pointer).map(Value::take);
                if node.is_none() {
                    warn!(path = %source_path_str, pointer, "JSON pointer matched nothing");
                }
                node
            })
            .collect();
        Ok(LoadedFile::Selected(selected))
    }
}

impl SamplesCmd {
    fn run(&self) -> anyhow::Result<Value> {
        let mut config = match self.config.as_ref() {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("failed to read config file ({})", path.display()))?;
                json_typegraph::path_de::from_slice_with_path::<InferenceConfig>(&bytes)
                    .map_err(|error| anyhow!("invalid config file ({}): {error}", path.display()))?
            }
            None => InferenceConfig::default(),
        };
        config.handle_refs |= self.handle_refs;

        let mut inference = Inference::new(config);
        self.input_settings.observe_all(&mut inference)?;
        debug!(documents = inference.sample_count(), "loaded samples");
        let mut graph = TypeGraph::new();
        inference.solve(&mut graph, &self.name)?;
        Ok(graph.to_json())
    }
}

impl SchemaCmd {
    fn run(&self) -> anyhow::Result<Value> {
        let uris = resolve_schema_inputs(&self.input)?;
        if self.name.is_some() && uris.len() != 1 {
            bail!("--name needs exactly one schema input, got {}", uris.len());
        }
        let mut input = JsonSchemaInput::new(Some(Box::new(FileStore)));
        for uri in uris {
            input.add_source(SchemaSource { name: self.name.clone(), uris: vec![uri], schema: None })?;
        }
        let mut graph = TypeGraph::new();
        let report = input.add_types(&mut graph)?;
        for (name, error) in &report.failed {
            eprintln!("{} {name}: {error}", "failed:".red().bold());
        }
        if report.converted.is_empty() && !report.failed.is_empty() {
            bail!("no schema could be converted");
        }
        Ok(graph.to_json())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> anyhow::Result<()> {
        let (output, out) = match &self.cmd {
            Command::Samples(target) => (target.run()?, target.out.as_ref()),
            Command::Schema(target) => (target.run()?, target.out.as_ref()),
        };
        let output_src = serde_json::to_string_pretty(&output)?;
        if let Some(out) = out {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &output_src)
                .with_context(|| format!("failed to write {}", out.display()))?;
        } else {
            println!("{output_src}");
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// URIs pass through; everything else is a path or glob pattern.
fn resolve_schema_inputs(inputs: &[String]) -> anyhow::Result<Vec<String>> {
    let mut out = Vec::new();
    for input in inputs {
        // Single-letter schemes are Windows drive letters.
        let is_uri = Url::parse(input).is_ok_and(|url| url.scheme().len() > 1);
        if is_uri || input.contains('#') {
            out.push(input.clone());
            continue;
        }
        let paths = resolve_file_path_patterns([input])
            .map_err(|error| anyhow!("failed to resolve schema input `{input}`: {error}"))?;
        out.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
    }
    Ok(out)
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                match entry {
                    Ok(p) => {
                        matched_any = true;
                        out.push(p);
                    }
                    Err(e) => return Err(Box::new(e)),
                }
            }
            if !matched_any {
                return Err(format!("glob pattern matched no files: {pattern}").into());
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
