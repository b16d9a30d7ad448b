// src/core/batch.rs

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::models::{ProbeOptions, SiteReport};
use crate::core::scanner::Prober;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
}

/// Result of probing one target of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetOutcome {
    Report(Box<SiteReport>),
    Failed { url: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub progress: usize,
    pub total: usize,
    pub results: Vec<TargetOutcome>,
}

/// Keyed store of batch tasks.
///
/// A task is created on `submit`, updated after each target, and kept until
/// `clear`/`clear_all` removes it.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<TaskId, TaskState>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a batch and starts probing it in the background.
    ///
    /// Targets are probed one after another; the returned handle resolves once
    /// the task is marked completed.
    pub async fn submit(
        &self,
        prober: Arc<Prober>,
        urls: Vec<String>,
        options: ProbeOptions,
    ) -> (TaskId, JoinHandle<()>) {
        let id = Uuid::new_v4();
        self.tasks.lock().await.insert(
            id,
            TaskState { status: TaskStatus::Running, progress: 0, total: urls.len(), results: Vec::new() },
        );
        info!(task = %id, targets = urls.len(), "Batch submitted.");

        let registry = self.clone();
        let handle = tokio::spawn(async move {
            for url in urls {
                let outcome = match prober.probe(&url, &options).await {
                    Ok(report) => TargetOutcome::Report(Box::new(report)),
                    Err(e) => {
                        error!(task = %id, url = %url, error = %e, "Target could not be probed.");
                        TargetOutcome::Failed { url, error: e.to_string() }
                    }
                };
                registry.record(id, outcome).await;
            }
            registry.finish(id).await;
        });
        (id, handle)
    }

    async fn record(&self, id: TaskId, outcome: TargetOutcome) {
        // A task cleared mid-run simply stops being tracked.
        if let Some(state) = self.tasks.lock().await.get_mut(&id) {
            state.results.push(outcome);
            state.progress += 1;
        }
    }

    async fn finish(&self, id: TaskId) {
        if let Some(state) = self.tasks.lock().await.get_mut(&id) {
            state.status = TaskStatus::Completed;
            info!(task = %id, progress = state.progress, total = state.total, "Batch completed.");
        }
    }

    /// Snapshot of a task's status, progress and results so far.
    pub async fn get(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.lock().await.get(&id).cloned()
    }

    /// Forgets a task. Returns whether it existed.
    pub async fn clear(&self, id: TaskId) -> bool {
        self.tasks.lock().await.remove(&id).is_some()
    }

    pub async fn clear_all(&self) {
        self.tasks.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;

    fn prober() -> Arc<Prober> {
        let mut config = ProbeConfig::default();
        config.multi_resolver = false;
        Arc::new(Prober::new(config).expect("prober"))
    }

    #[tokio::test]
    async fn batch_records_reports_and_per_target_errors() {
        let registry = TaskRegistry::new();
        let options = ProbeOptions { fetch_resources: false, resource_limit: 1, check_advanced: false };
        let urls = vec!["http://".to_string(), "http://127.0.0.1:9".to_string()];

        let (id, handle) = registry.submit(prober(), urls, options).await;
        handle.await.expect("task joins");

        let state = registry.get(id).await.expect("task tracked");
        assert_eq!(state.status, TaskStatus::Completed);
        assert_eq!(state.total, 2);
        assert_eq!(state.progress, 2);
        assert!(matches!(&state.results[0], TargetOutcome::Failed { url, .. } if url == "http://"));
        match &state.results[1] {
            TargetOutcome::Report(report) => {
                assert_eq!(report.tls.score, 0);
                assert!(report.status_code.is_none());
            }
            other => panic!("expected a report, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn tasks_are_kept_until_cleared() {
        let registry = TaskRegistry::new();
        let (first, h1) = registry.submit(prober(), Vec::new(), ProbeOptions::default()).await;
        let (second, h2) = registry.submit(prober(), Vec::new(), ProbeOptions::default()).await;
        h1.await.expect("join");
        h2.await.expect("join");

        assert_eq!(registry.len().await, 2);
        assert!(registry.clear(first).await);
        assert!(!registry.clear(first).await);
        assert!(registry.get(second).await.is_some());

        registry.clear_all().await;
        assert_eq!(registry.len().await, 0);
    }

    #[test]
    fn status_renders_lowercase() {
        assert_eq!(TaskStatus::Running.to_string(), "running");
    }
}
