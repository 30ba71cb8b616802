//! In-memory job function registry.
//!
//! Task functions are registered by key at startup; jobs resolve their
//! callable here. There is no reflection and no dotted-path import: a key
//! that was never registered logs a warning and its job is skipped.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::warn;

use crate::common::AppResult;

/// A registered job body. Returns a short human-readable result summary.
pub type JobFn = Arc<dyn Fn() -> BoxFuture<'static, AppResult<String>> + Send + Sync>;

#[derive(Default)]
pub struct JobRegistry {
    functions: RwLock<HashMap<String, JobFn>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable under a task-function key. Re-registering a key
    /// replaces the previous callable.
    pub async fn register<F, Fut>(&self, key: &str, func: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AppResult<String>> + Send + 'static,
    {
        let wrapped: JobFn = Arc::new(move || Box::pin(func()));
        let mut functions = self.functions.write().await;
        if functions.insert(key.to_string(), wrapped).is_some() {
            warn!("job function {key:?} re-registered");
        }
    }

    pub async fn resolve(&self, key: &str) -> Option<JobFn> {
        self.functions.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.functions.read().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.functions.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_runs_the_registered_function() {
        let registry = JobRegistry::new();
        registry
            .register("echo", || async { Ok("done".to_string()) })
            .await;

        let func = registry.resolve("echo").await.expect("registered");
        let result = func().await.expect("runs");
        assert_eq!(result, "done");
    }

    #[tokio::test]
    async fn unknown_key_resolves_to_none() {
        let registry = JobRegistry::new();
        assert!(registry.resolve("missing").await.is_none());
        assert!(!registry.contains("missing").await);
    }

    #[tokio::test]
    async fn keys_are_sorted() {
        let registry = JobRegistry::new();
        registry.register("b", || async { Ok(String::new()) }).await;
        registry.register("a", || async { Ok(String::new()) }).await;
        assert_eq!(registry.keys().await, vec!["a".to_string(), "b".to_string()]);
    }
}
