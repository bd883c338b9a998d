//! Plugin Manager
//!
//! Coordinates execution of callbacks across all registered plugins.

use crate::callbacks::BeforeModelResult;
use crate::Plugin;
use loom_core::{CallbackContext, Content, Event, InvocationContext, LlmRequest, LlmResponse, LoomError, Result, Tool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the PluginManager.
#[derive(Clone)]
pub struct PluginManagerConfig {
    /// Timeout for closing plugins during shutdown.
    pub close_timeout: Duration,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self { close_timeout: Duration::from_secs(5) }
    }
}

/// Manages a collection of plugins and coordinates callback execution.
///
/// Every hook runs plugins in registration order. For hooks that can
/// substitute a value (on_user_message, on_event, before_model, after_model,
/// before_agent, after_agent, before_tool, after_tool, the error hooks), the
/// **first** plugin to return `Some` wins and no further plugin runs for that
/// hook on that call — later plugins never get a chance to clobber an
/// earlier one's answer.
///
/// # Example
///
/// ```rust,ignore
/// use loom_plugin::{Plugin, PluginManager, PluginConfig};
///
/// let plugins = vec![
///     Plugin::new(PluginConfig {
///         name: "logging".to_string(),
///         on_event: Some(log_events()),
///         ..Default::default()
///     }),
/// ];
///
/// let manager = PluginManager::new(plugins)?;
/// ```
pub struct PluginManager {
    plugins: Vec<Plugin>,
    config: PluginManagerConfig,
}

impl PluginManager {
    /// Create a new plugin manager with the given plugins.
    ///
    /// # Errors
    ///
    /// Returns [`LoomError::DuplicatePlugins`] if two plugins share a name.
    pub fn new(plugins: Vec<Plugin>) -> Result<Self> {
        Self::with_config(plugins, PluginManagerConfig::default())
    }

    /// Create a new plugin manager with custom configuration.
    pub fn with_config(plugins: Vec<Plugin>, config: PluginManagerConfig) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut dupes = Vec::new();
        for p in &plugins {
            if !seen.insert(p.name().to_string()) {
                dupes.push(p.name().to_string());
            }
        }
        if !dupes.is_empty() {
            return Err(LoomError::DuplicatePlugins(dupes));
        }
        Ok(Self { plugins, config })
    }

    /// Get the number of registered plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Get plugin names.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run on_user_message callbacks. The first plugin to modify the
    /// content short-circuits the rest.
    pub async fn run_on_user_message(&self, ctx: Arc<dyn InvocationContext>, content: Content) -> Result<Option<Content>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.on_user_message() {
                debug!(plugin = plugin.name(), "running on_user_message callback");
                match callback(ctx.clone(), content.clone()).await {
                    Ok(Some(modified)) => {
                        debug!(plugin = plugin.name(), "content modified by plugin");
                        return Ok(Some(modified));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "on_user_message callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run on_event callbacks. The first plugin to modify the event
    /// short-circuits the rest.
    pub async fn run_on_event(&self, ctx: Arc<dyn InvocationContext>, event: Event) -> Result<Option<Event>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.on_event() {
                debug!(plugin = plugin.name(), event_id = %event.id, "running on_event callback");
                match callback(ctx.clone(), event.clone()).await {
                    Ok(Some(modified)) => {
                        debug!(plugin = plugin.name(), "event modified by plugin");
                        return Ok(Some(modified));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "on_event callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run before_run callbacks. If any plugin returns content, the run is
    /// skipped entirely.
    pub async fn run_before_run(&self, ctx: Arc<dyn InvocationContext>) -> Result<Option<Content>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.before_run() {
                debug!(plugin = plugin.name(), "running before_run callback");
                match callback(ctx.clone()).await {
                    Ok(Some(content)) => {
                        debug!(plugin = plugin.name(), "before_run returned early exit content");
                        return Ok(Some(content));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "before_run callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run after_run callbacks on every plugin. Cleanup/metrics only; no
    /// short-circuit since there is nothing left to substitute.
    pub async fn run_after_run(&self, ctx: Arc<dyn InvocationContext>) {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.after_run() {
                debug!(plugin = plugin.name(), "running after_run callback");
                callback(ctx.clone()).await;
            }
        }
    }

    /// Run before_agent callbacks. The first plugin to return content skips
    /// the agent's own run.
    pub async fn run_before_agent(&self, ctx: Arc<dyn CallbackContext>) -> Result<Option<Content>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.before_agent() {
                debug!(plugin = plugin.name(), "running before_agent callback");
                match callback(ctx.clone()).await {
                    Ok(Some(content)) => {
                        debug!(plugin = plugin.name(), "before_agent returned early exit content");
                        return Ok(Some(content));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "before_agent callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run after_agent callbacks. The first plugin to return content wins.
    pub async fn run_after_agent(&self, ctx: Arc<dyn CallbackContext>) -> Result<Option<Content>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.after_agent() {
                debug!(plugin = plugin.name(), "running after_agent callback");
                match callback(ctx.clone()).await {
                    Ok(Some(content)) => {
                        debug!(plugin = plugin.name(), "after_agent returned content");
                        return Ok(Some(content));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "after_agent callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run before_model callbacks, threading the (possibly rewritten)
    /// request through each plugin until one skips the model call outright.
    pub async fn run_before_model(&self, ctx: Arc<dyn CallbackContext>, request: LlmRequest) -> Result<BeforeModelResult> {
        let mut current_request = request;

        for plugin in &self.plugins {
            if let Some(callback) = plugin.before_model() {
                debug!(plugin = plugin.name(), "running before_model callback");
                match callback(ctx.clone(), current_request.clone()).await {
                    Ok(BeforeModelResult::Continue(modified)) => {
                        current_request = modified;
                    }
                    Ok(BeforeModelResult::Skip(response)) => {
                        debug!(plugin = plugin.name(), "before_model skipped model call");
                        return Ok(BeforeModelResult::Skip(response));
                    }
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "before_model callback failed");
                        return Err(e);
                    }
                }
            }
        }

        Ok(BeforeModelResult::Continue(current_request))
    }

    /// Run after_model callbacks. The first plugin to modify the response
    /// short-circuits the rest.
    pub async fn run_after_model(&self, ctx: Arc<dyn CallbackContext>, response: LlmResponse) -> Result<Option<LlmResponse>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.after_model() {
                debug!(plugin = plugin.name(), "running after_model callback");
                match callback(ctx.clone(), response.clone()).await {
                    Ok(Some(modified)) => return Ok(Some(modified)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "after_model callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run on_model_error callbacks. The first plugin to supply a fallback
    /// response wins.
    pub async fn run_on_model_error(&self, ctx: Arc<dyn CallbackContext>, request: LlmRequest, error: String) -> Result<Option<LlmResponse>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.on_model_error() {
                debug!(plugin = plugin.name(), "running on_model_error callback");
                match callback(ctx.clone(), request.clone(), error.clone()).await {
                    Ok(Some(response)) => {
                        debug!(plugin = plugin.name(), "on_model_error provided fallback response");
                        return Ok(Some(response));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "on_model_error callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run before_tool callbacks. The first plugin to substitute tool args
    /// short-circuits the rest.
    pub async fn run_before_tool(
        &self,
        ctx: Arc<dyn CallbackContext>,
        tool: Arc<dyn Tool>,
        args: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.before_tool() {
                debug!(plugin = plugin.name(), tool = tool.name(), "running before_tool callback");
                match callback(ctx.clone(), tool.clone(), args.clone()).await {
                    Ok(Some(modified)) => return Ok(Some(modified)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "before_tool callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run after_tool callbacks. The first plugin to substitute a result
    /// short-circuits the rest.
    pub async fn run_after_tool(
        &self,
        ctx: Arc<dyn CallbackContext>,
        tool: Arc<dyn Tool>,
        result: serde_json::Value,
    ) -> Result<Option<serde_json::Value>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.after_tool() {
                debug!(plugin = plugin.name(), tool = tool.name(), "running after_tool callback");
                match callback(ctx.clone(), tool.clone(), result.clone()).await {
                    Ok(Some(modified)) => return Ok(Some(modified)),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "after_tool callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run on_tool_error callbacks. The first plugin to supply a fallback
    /// result wins.
    pub async fn run_on_tool_error(
        &self,
        ctx: Arc<dyn CallbackContext>,
        tool: Arc<dyn Tool>,
        args: serde_json::Value,
        error: String,
    ) -> Result<Option<serde_json::Value>> {
        for plugin in &self.plugins {
            if let Some(callback) = plugin.on_tool_error() {
                debug!(plugin = plugin.name(), tool = tool.name(), "running on_tool_error callback");
                match callback(ctx.clone(), tool.clone(), args.clone(), error.clone()).await {
                    Ok(Some(result)) => {
                        debug!(plugin = plugin.name(), "on_tool_error provided fallback result");
                        return Ok(Some(result));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(plugin = plugin.name(), error = %e, "on_tool_error callback failed");
                        return Err(e);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Close all plugins with timeout.
    pub async fn close(&self) {
        debug!("closing {} plugins", self.plugins.len());

        for plugin in &self.plugins {
            let close_future = plugin.close();
            match tokio::time::timeout(self.config.close_timeout, close_future).await {
                Ok(()) => {
                    debug!(plugin = plugin.name(), "plugin closed successfully");
                }
                Err(_) => {
                    warn!(plugin = plugin.name(), "plugin close timed out");
                }
            }
        }
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugin_count", &self.plugins.len())
            .field("plugin_names", &self.plugin_names())
            .field("close_timeout", &self.config.close_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PluginConfig;

    #[test]
    fn test_plugin_manager_creation() {
        let plugins = vec![
            Plugin::new(PluginConfig { name: "test1".to_string(), ..Default::default() }),
            Plugin::new(PluginConfig { name: "test2".to_string(), ..Default::default() }),
        ];

        let manager = PluginManager::new(plugins).unwrap();
        assert_eq!(manager.plugin_count(), 2);
        assert_eq!(manager.plugin_names(), vec!["test1", "test2"]);
    }

    #[test]
    fn test_plugin_manager_rejects_duplicate_names() {
        let plugins = vec![
            Plugin::new(PluginConfig { name: "dup".to_string(), ..Default::default() }),
            Plugin::new(PluginConfig { name: "dup".to_string(), ..Default::default() }),
        ];

        let err = PluginManager::new(plugins).unwrap_err();
        assert!(matches!(err, LoomError::DuplicatePlugins(_)));
    }
}
