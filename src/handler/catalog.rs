// src/handler/catalog.rs

//! Entry-point resolution for pipeline handlers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::context::Context;
use crate::errors::{EvalflowError, Result};
use crate::handler::builtin::{LINE_STATS_ENTRY, LineStatsHandler};
use crate::handler::{HandlerMethod, PipelineHandler};

type Constructor =
    Arc<dyn Fn(&Context) -> anyhow::Result<Box<dyn PipelineHandler>> + Send + Sync>;

/// A registered handler type: its entry-point name, declared capabilities
/// and a type-erased constructor.
#[derive(Clone)]
pub struct HandlerEntry {
    name: String,
    capabilities: Vec<HandlerMethod>,
    construct: Constructor,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl HandlerEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &[HandlerMethod] {
        &self.capabilities
    }
}

/// Table of handler entry points known to this process.
#[derive(Debug, Clone, Default)]
pub struct HandlerCatalog {
    entries: BTreeMap<String, HandlerEntry>,
}

impl HandlerCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog
            .entries
            .insert(LINE_STATS_ENTRY.to_string(), entry_for::<LineStatsHandler>(LINE_STATS_ENTRY));
        catalog
    }

    /// Register handler type `H` under `name`.
    pub fn register<H>(&mut self, name: impl Into<String>) -> Result<()>
    where
        H: PipelineHandler + 'static,
    {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(EvalflowError::Config(format!(
                "handler entry '{name}' is already registered"
            )));
        }
        debug!(entry = %name, capabilities = ?H::capabilities(), "registered handler");
        self.entries.insert(name.clone(), entry_for::<H>(&name));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.get(name)
    }

    /// Resolve the handler declared by `cfg` for the model in `workdir`.
    ///
    /// Fails with `HandlerResolution` if the workdir or the entry point
    /// cannot be found, and with `HandlerContract` unless the handler
    /// declares every [`HandlerMethod`], whichever steps the graph uses.
    pub fn load(&self, workdir: &Path, cfg: &ConfigFile) -> Result<HandlerFactory> {
        let entry_name = cfg.run.handler.trim();

        if !workdir.is_dir() {
            return Err(EvalflowError::HandlerResolution {
                entry: entry_name.to_string(),
                workdir: workdir.display().to_string(),
                reason: "workdir does not exist".to_string(),
            });
        }

        let entry = self.entries.get(entry_name).ok_or_else(|| {
            EvalflowError::HandlerResolution {
                entry: entry_name.to_string(),
                workdir: workdir.display().to_string(),
                reason: format!(
                    "no handler registered under this name (known: {})",
                    self.names().collect::<Vec<_>>().join(", ")
                ),
            }
        })?;

        let missing: Vec<String> = HandlerMethod::ALL
            .into_iter()
            .filter(|m| !entry.capabilities.contains(m))
            .map(|m| m.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(EvalflowError::HandlerContract {
                entry: entry.name.clone(),
                missing,
            });
        }

        debug!(entry = %entry.name, workdir = %workdir.display(), "resolved handler");
        Ok(HandlerFactory {
            entry: entry.clone(),
            workdir: workdir.to_path_buf(),
        })
    }
}

fn entry_for<H>(name: &str) -> HandlerEntry
where
    H: PipelineHandler + 'static,
{
    HandlerEntry {
        name: name.to_string(),
        capabilities: H::capabilities().to_vec(),
        construct: Arc::new(|ctx: &Context| {
            H::construct(ctx).map(|h| Box::new(h) as Box<dyn PipelineHandler>)
        }),
    }
}

/// A resolved, contract-checked handler ready to be instantiated per task.
#[derive(Debug, Clone)]
pub struct HandlerFactory {
    entry: HandlerEntry,
    workdir: PathBuf,
}

impl HandlerFactory {
    pub fn entry_name(&self) -> &str {
        &self.entry.name
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Instantiate the handler for one task.
    pub fn construct(&self, context: &Context) -> anyhow::Result<Box<dyn PipelineHandler>> {
        (self.entry.construct)(context)
    }
}
