//! Plugin discovery
//!
//! Scans the configured discovery directories for plugin manifests, runs the
//! static validator over each file, instantiates providers from the ones
//! that pass, and registers their tools with the registry and capability
//! index. A filesystem watcher reloads a plugin when its file changes and
//! unregisters it when the file is deleted.

pub mod manifest;
pub mod validator;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::registry::{CapabilityIndex, ToolDescriptor, ToolProvider, ToolRegistry};

pub use manifest::{PluginManifest, ToolKind, ToolManifest};
pub use validator::{validate_source, ValidationOutcome};

/// Validation state of one discovered file
#[derive(Debug, Clone)]
pub enum PluginStatus {
    Loaded,
    Rejected(Vec<String>),
}

/// Bookkeeping for one plugin file
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub path: PathBuf,
    pub content_hash: String,
    pub status: PluginStatus,
    pub provider_name: Option<String>,
    pub tool_names: Vec<String>,
    pub discovered_at: DateTime<Utc>,
}

/// A provider instantiated from a validated manifest
pub struct PluginProvider {
    meta: manifest::ProviderMeta,
    tools: Vec<ToolManifest>,
}

impl PluginProvider {
    pub fn from_manifest(manifest: PluginManifest) -> Self {
        Self {
            meta: manifest.provider,
            tools: manifest.tools,
        }
    }
}

#[async_trait]
impl ToolProvider for PluginProvider {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn description(&self) -> &str {
        &self.meta.description
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor(&self.meta.name, &self.meta.version))
            .collect()
    }

    async fn call(&self, tool: &str, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name == tool)
            .ok_or_else(|| ToolError::NotFound(tool.to_string()))?;
        let substituted = tool.substitute(args)?;
        match tool.kind {
            ToolKind::Expression => {
                let mut bindings = std::collections::HashMap::new();
                let mut evaluator = crate::providers::calc::Evaluator::new(&mut bindings);
                match evaluator.eval(&substituted) {
                    Ok(value) => Ok(Value::String(value.format())),
                    Err(error) if error.is_validation() => {
                        Err(ToolError::Validation(error.to_string()))
                    }
                    Err(error) => Err(ToolError::Execution(error.to_string())),
                }
            }
            ToolKind::Response => Ok(Value::String(substituted)),
        }
    }
}

/// Discovers, validates, registers, and watches plugin files
pub struct PluginLoader {
    registry: Arc<ToolRegistry>,
    index: Arc<CapabilityIndex>,
    paths: Vec<PathBuf>,
    records: Mutex<HashMap<PathBuf, PluginRecord>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

/// Whether a directory entry is a candidate plugin file: flat `.toml`,
/// not underscore-prefixed.
fn is_plugin_file(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
        return false;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => !name.starts_with('_'),
        None => false,
    }
}

impl PluginLoader {
    pub fn new(
        registry: Arc<ToolRegistry>,
        index: Arc<CapabilityIndex>,
        paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            registry,
            index,
            paths,
            records: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
        }
    }

    /// Scan every discovery path once. Returns how many plugins loaded.
    pub async fn discover_all(&self) -> usize {
        let mut loaded = 0;
        for dir in self.paths.clone() {
            if !dir.is_dir() {
                debug!(path = %dir.display(), "plugin directory does not exist, skipping");
                continue;
            }
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) => {
                    warn!(path = %dir.display(), %error, "failed to read plugin directory");
                    continue;
                }
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                // Flat scan only: subdirectories are not descended into.
                if path.is_dir() || !is_plugin_file(&path) {
                    continue;
                }
                if self.load_file(&path).await {
                    loaded += 1;
                }
            }
        }
        loaded
    }

    /// Validate and (re)load one plugin file. Returns whether it registered.
    pub async fn load_file(&self, path: &Path) -> bool {
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                warn!(path = %path.display(), %error, "failed to read plugin file");
                return false;
            }
        };
        let content_hash = format!("{:x}", Sha256::digest(source.as_bytes()));

        // Unchanged content: nothing to do.
        if let Some(existing) = self.records.lock().get(path) {
            if existing.content_hash == content_hash
                && matches!(existing.status, PluginStatus::Loaded)
            {
                return false;
            }
        }

        // A reload replaces whatever this file previously registered.
        self.unload_file(path).await;

        let outcome = validate_source(&source);
        for warning in &outcome.warnings {
            warn!(path = %path.display(), warning, "plugin validation warning");
        }
        if !outcome.passed() {
            warn!(
                path = %path.display(),
                reasons = %outcome.errors.join("; "),
                "plugin rejected by validator"
            );
            self.records.lock().insert(
                path.to_path_buf(),
                PluginRecord {
                    path: path.to_path_buf(),
                    content_hash,
                    status: PluginStatus::Rejected(outcome.errors),
                    provider_name: None,
                    tool_names: Vec::new(),
                    discovered_at: Utc::now(),
                },
            );
            return false;
        }

        let manifest = match PluginManifest::parse(&source) {
            Ok(manifest) => manifest,
            Err(error) => {
                warn!(path = %path.display(), %error, "manifest parse failed after validation");
                return false;
            }
        };

        let provider = Arc::new(PluginProvider::from_manifest(manifest));
        if let Err(error) = provider.initialize().await {
            warn!(path = %path.display(), %error, "plugin provider failed to initialize");
            return false;
        }

        let descriptors = provider.tools();
        let tool_names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        for descriptor in descriptors {
            self.index.index(&descriptor);
            self.registry.register(descriptor, provider.clone());
        }

        info!(
            path = %path.display(),
            provider = provider.name(),
            tools = tool_names.len(),
            "plugin loaded"
        );
        self.records.lock().insert(
            path.to_path_buf(),
            PluginRecord {
                path: path.to_path_buf(),
                content_hash,
                status: PluginStatus::Loaded,
                provider_name: Some(provider.name().to_string()),
                tool_names,
                discovered_at: Utc::now(),
            },
        );
        true
    }

    /// Drop everything a plugin file registered.
    pub async fn unload_file(&self, path: &Path) {
        let record = self.records.lock().remove(path);
        let Some(record) = record else {
            return;
        };
        for tool in &record.tool_names {
            self.registry.unregister(tool);
            self.index.remove(tool);
        }
        if let Some(provider) = &record.provider_name {
            info!(path = %path.display(), provider, "plugin unloaded");
        }
    }

    /// Start watching the discovery directories for changes. Modified files
    /// reload, deleted files unregister. Idempotent.
    pub fn watch(self: &Arc<Self>) -> crate::error::Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                let _ = tx.send(event);
            }
        })
        .map_err(|e| crate::error::Error::Plugin(format!("watcher init failed: {}", e)))?;

        for dir in &self.paths {
            if dir.is_dir() {
                watcher
                    .watch(dir, RecursiveMode::NonRecursive)
                    .map_err(|e| {
                        crate::error::Error::Plugin(format!(
                            "failed to watch {}: {}",
                            dir.display(),
                            e
                        ))
                    })?;
            }
        }

        let loader = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for path in &event.paths {
                    if !is_plugin_file(path) {
                        continue;
                    }
                    match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) => {
                            loader.load_file(path).await;
                        }
                        EventKind::Remove(_) => {
                            loader.unload_file(path).await;
                        }
                        _ => {}
                    }
                }
            }
            debug!("plugin watcher channel closed");
        });

        *slot = Some(watcher);
        Ok(())
    }

    /// Stop the filesystem watcher.
    pub fn stop(&self) {
        *self.watcher.lock() = None;
    }

    pub fn records(&self) -> Vec<PluginRecord> {
        self.records.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_PLUGIN: &str = r#"
[provider]
name = "geometry"
description = "Geometry helpers"

[[tool]]
name = "hypotenuse"
description = "Length of the hypotenuse"
category = "mathematics"
kind = "expression"
template = "sqrt({a}**2 + {b}**2)"

[tool.params.a]
type = "number"
required = true

[tool.params.b]
type = "number"
required = true
"#;

    fn loader_in(dir: &Path) -> Arc<PluginLoader> {
        Arc::new(PluginLoader::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(CapabilityIndex::new()),
            vec![dir.to_path_buf()],
        ))
    }

    #[tokio::test]
    async fn discovery_registers_valid_plugin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("geometry.toml"), GOOD_PLUGIN).unwrap();

        let loader = loader_in(dir.path());
        assert_eq!(loader.discover_all().await, 1);
        assert!(loader.registry.lookup("geometry_hypotenuse").is_some());
        assert!(loader.index.get("geometry_hypotenuse").is_some());
    }

    #[tokio::test]
    async fn rejected_plugin_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("evil.toml"),
            "import os\nos.system(\"rm -rf /\")\n",
        )
        .unwrap();

        let loader = loader_in(dir.path());
        assert_eq!(loader.discover_all().await, 0);
        assert!(loader.registry.is_empty());

        let records = loader.records();
        assert_eq!(records.len(), 1);
        match &records[0].status {
            PluginStatus::Rejected(reasons) => {
                assert!(reasons.iter().any(|r| r.contains("forbidden import 'os'")));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn underscore_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("_draft.toml"), GOOD_PLUGIN).unwrap();

        let loader = loader_in(dir.path());
        assert_eq!(loader.discover_all().await, 0);
        assert!(loader.registry.is_empty());
    }

    #[tokio::test]
    async fn subdirectories_are_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("geometry.toml"), GOOD_PLUGIN).unwrap();

        let loader = loader_in(dir.path());
        assert_eq!(loader.discover_all().await, 0);
    }

    #[tokio::test]
    async fn unload_removes_registered_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.toml");
        std::fs::write(&path, GOOD_PLUGIN).unwrap();

        let loader = loader_in(dir.path());
        loader.discover_all().await;
        assert_eq!(loader.registry.len(), 1);

        loader.unload_file(&path).await;
        assert!(loader.registry.is_empty());
        assert!(loader.index.get("geometry_hypotenuse").is_none());
        assert!(loader.records().is_empty());
    }

    #[tokio::test]
    async fn modified_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geometry.toml");
        std::fs::write(&path, GOOD_PLUGIN).unwrap();

        let loader = loader_in(dir.path());
        loader.discover_all().await;

        // Same content: a reload is a no-op.
        assert!(!loader.load_file(&path).await);

        let updated = GOOD_PLUGIN.replace("Length of the hypotenuse", "Hypotenuse length");
        std::fs::write(&path, updated).unwrap();
        assert!(loader.load_file(&path).await);
        let descriptor = loader
            .registry
            .lookup("geometry_hypotenuse")
            .unwrap()
            .descriptor;
        assert_eq!(descriptor.description, "Hypotenuse length");
    }

    #[tokio::test]
    async fn plugin_tool_executes_expression() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("geometry.toml"), GOOD_PLUGIN).unwrap();

        let loader = loader_in(dir.path());
        loader.discover_all().await;

        let entry = loader.registry.lookup("geometry_hypotenuse").unwrap();
        let mut args = Map::new();
        args.insert("a".into(), serde_json::json!(3));
        args.insert("b".into(), serde_json::json!(4));
        let result = entry.execute(&args).await.unwrap();
        assert_eq!(result, serde_json::json!("5"));
    }
}
