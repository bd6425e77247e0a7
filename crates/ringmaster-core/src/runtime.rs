//! Engine runtime
//!
//! The context object carried through every public entry point: it owns the
//! config, registry, capability index, stats, dispatcher, baseline
//! providers, and the plugin loader. Built once at startup, torn down on
//! shutdown; executors never reach for globals.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{info, warn};

use crate::agent::Agent;
use crate::config::{defaults, AgentConfig};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::plugins::{PluginLoader, PluginRecord};
use crate::providers::{
    CalculationProvider, DevProvider, MonitoringProvider, RemoteProvider, WebSearchConfig,
    WebSearchProvider,
};
use crate::registry::{CapabilityIndex, ToolProvider, ToolRegistry};
use crate::ssh::{SshPool, SshSettings};
use crate::stats::AgentStats;

/// Builder with per-provider toggles
pub struct RuntimeBuilder {
    config: AgentConfig,
    workspace: PathBuf,
    include_calc: bool,
    include_dev: bool,
    include_monitor: bool,
    include_websearch: bool,
    include_remote: bool,
    include_plugins: bool,
    websearch_config: Option<WebSearchConfig>,
}

impl RuntimeBuilder {
    pub fn new(config: AgentConfig) -> Self {
        let include_remote = config.remote_configured();
        Self {
            config,
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            include_calc: true,
            include_dev: true,
            include_monitor: true,
            include_websearch: true,
            include_remote,
            include_plugins: true,
            websearch_config: None,
        }
    }

    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn with_calc(mut self, enabled: bool) -> Self {
        self.include_calc = enabled;
        self
    }

    pub fn with_dev(mut self, enabled: bool) -> Self {
        self.include_dev = enabled;
        self
    }

    pub fn with_monitor(mut self, enabled: bool) -> Self {
        self.include_monitor = enabled;
        self
    }

    pub fn with_websearch(mut self, enabled: bool) -> Self {
        self.include_websearch = enabled;
        self
    }

    pub fn with_remote(mut self, enabled: bool) -> Self {
        self.include_remote = enabled;
        self
    }

    pub fn with_plugins(mut self, enabled: bool) -> Self {
        self.include_plugins = enabled;
        self
    }

    pub fn with_websearch_config(mut self, config: WebSearchConfig) -> Self {
        self.websearch_config = Some(config);
        self
    }

    /// Instantiate providers, initialize them, and register their tools.
    pub async fn build(self) -> Result<Runtime> {
        let registry = Arc::new(ToolRegistry::new());
        let index = Arc::new(CapabilityIndex::new());
        let stats = AgentStats::new();
        let mut providers: Vec<Arc<dyn ToolProvider>> = Vec::new();

        if self.include_calc {
            providers.push(Arc::new(CalculationProvider::new()));
        }
        if self.include_dev {
            providers.push(Arc::new(DevProvider::new(self.workspace.clone())));
        }
        if self.include_monitor {
            providers.push(Arc::new(MonitoringProvider::new()));
        }
        if self.include_websearch {
            let config = self.websearch_config.clone().unwrap_or_default();
            providers.push(Arc::new(WebSearchProvider::new(config)));
        }

        let mut ssh_pool = None;
        if self.include_remote {
            match SshSettings::from_config(&self.config) {
                Ok(settings) => {
                    let pool = Arc::new(SshPool::new(settings));
                    providers.push(Arc::new(RemoteProvider::new(pool.clone())));
                    ssh_pool = Some(pool);
                }
                Err(error) => {
                    warn!(%error, "remote provider disabled: SSH is not configured");
                }
            }
        }

        for provider in &providers {
            provider.initialize().await?;
            for descriptor in provider.tools() {
                index.index(&descriptor);
                registry.register(descriptor, provider.clone());
            }
            info!(provider = provider.name(), "provider registered");
        }

        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), stats.clone()));

        let plugin_loader = if self.include_plugins {
            let loader = Arc::new(PluginLoader::new(
                registry.clone(),
                index.clone(),
                self.config.plugin_discovery_paths.clone(),
            ));
            let loaded = loader.discover_all().await;
            info!(loaded, "plugin discovery finished");
            Some(loader)
        } else {
            None
        };

        if let Some(pool) = &ssh_pool {
            spawn_idle_sweeper(Arc::downgrade(pool));
        }

        Ok(Runtime {
            config: self.config,
            registry,
            index,
            stats,
            dispatcher,
            providers,
            plugin_loader,
            ssh_pool,
        })
    }
}

/// Periodic eviction of idle SSH connections. Ends when the pool is gone.
fn spawn_idle_sweeper(pool: Weak<SshPool>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            match pool.upgrade() {
                Some(pool) => {
                    pool.sweep();
                }
                None => break,
            }
        }
    });
}

/// Assembled engine state
pub struct Runtime {
    config: AgentConfig,
    registry: Arc<ToolRegistry>,
    index: Arc<CapabilityIndex>,
    stats: Arc<AgentStats>,
    dispatcher: Arc<Dispatcher>,
    providers: Vec<Arc<dyn ToolProvider>>,
    plugin_loader: Option<Arc<PluginLoader>>,
    ssh_pool: Option<Arc<SshPool>>,
}

impl Runtime {
    pub fn builder(config: AgentConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn capability_index(&self) -> &Arc<CapabilityIndex> {
        &self.index
    }

    pub fn stats(&self) -> &Arc<AgentStats> {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn ssh_pool(&self) -> Option<&Arc<SshPool>> {
        self.ssh_pool.as_ref()
    }

    /// Start watching plugin directories for changes.
    pub fn watch_plugins(&self) -> Result<()> {
        if let Some(loader) = &self.plugin_loader {
            loader.watch()?;
        }
        Ok(())
    }

    pub fn plugin_records(&self) -> Vec<PluginRecord> {
        self.plugin_loader
            .as_ref()
            .map(|l| l.records())
            .unwrap_or_default()
    }

    /// Build the interaction loop over this runtime.
    pub fn agent(self: &Arc<Self>, llm: Arc<dyn LlmClient>) -> Agent {
        Agent::new(
            self.dispatcher.clone(),
            llm,
            defaults::HISTORY_TOKEN_BUDGET,
        )
    }

    /// Tear down providers and stop the plugin watcher.
    pub async fn shutdown(&self) {
        if let Some(loader) = &self.plugin_loader {
            loader.stop();
        }
        let outcomes = futures::future::join_all(self.providers.iter().map(|provider| async move {
            (provider.name().to_string(), provider.shutdown().await)
        }))
        .await;
        for (provider, outcome) in outcomes {
            if let Err(error) = outcome {
                warn!(provider, %error, "provider shutdown failed");
            }
        }
        info!("runtime shut down");
    }
}
