//! Demo controller: syncs "documents" seeded from a TOML file.
//!
//! ```toml
//! [controller]
//! name = "DocumentController"
//! workers = 2
//!
//! [[objects]]
//! namespace = "docs"
//! name = "readme"
//! content = "hello"
//! fail_first = 2
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use relevel_controller::{
    Controller, ControllerConfig, Factory, InMemorySource, SyncContext, SyncFn, SyncResult,
};
use relevel_core::{ObjectKey, ObjectMeta, Resource};
use relevel_events::Recorder;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Demo configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub controller: ControllerConfig,
    pub objects: Vec<SeedObject>,
}

impl DemoConfig {
    /// Load and validate a demo configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = relevel_core::load_toml(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        config.controller.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, workers: Option<usize>, resync_secs: Option<u64>) -> Self {
        if let Some(workers) = workers {
            self.controller.workers = workers;
        }
        if let Some(secs) = resync_secs {
            self.controller.resync_interval_secs = Some(secs);
        }
        self
    }
}

/// A document to place in the source at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedObject {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub content: String,
    /// Number of simulated sync failures before the document syncs.
    pub fail_first: u32,
}

/// The demo resource.
#[derive(Debug, Clone)]
pub struct Document {
    meta: ObjectMeta,
    content: String,
    fail_first: u32,
}

impl Resource for Document {
    fn meta(&self) -> &ObjectMeta {
        &self.meta
    }
}

impl From<SeedObject> for Document {
    fn from(seed: SeedObject) -> Self {
        let mut meta = ObjectMeta::new(seed.name);
        if let Some(namespace) = seed.namespace {
            meta = meta.with_namespace(namespace);
        }
        for (key, value) in seed.labels {
            meta = meta.with_label(key, value);
        }
        Self {
            meta,
            content: seed.content,
            fail_first: seed.fail_first,
        }
    }
}

/// Logs each document and records an event for it.
#[derive(Debug, Default)]
struct DocumentSync {
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl DocumentSync {
    /// Count a simulated failure for `document`, if it has any left.
    fn next_failure(&self, document: &Document) -> Option<u32> {
        let mut failures = self.failures.lock();
        let count = failures.entry(document.key()).or_insert(0);
        (*count < document.fail_first).then(|| {
            *count = count.saturating_add(1);
            *count
        })
    }
}

#[async_trait]
impl SyncFn<Document> for DocumentSync {
    async fn sync(&self, _cancel: CancellationToken, ctx: SyncContext<Document>) -> SyncResult {
        let Some(document) = ctx.queue_object() else {
            info!(controller = %ctx.controller_name(), "Periodic resync");
            ctx.events().event("Resync", "periodic resync");
            return Ok(());
        };
        let key = document.key();

        if let Some(attempt) = self.next_failure(&document) {
            ctx.events().warning(
                "DocumentSyncFailed",
                &format!("{key}: simulated failure {attempt}/{}", document.fail_first),
            );
            anyhow::bail!("simulated failure {attempt} for {key}");
        }

        info!(
            controller = %ctx.controller_name(),
            document = %key,
            bytes = document.content.len(),
            labels = document.meta.labels.len(),
            "Document synced"
        );
        ctx.events().event(
            "DocumentSynced",
            &format!("{key} ({} bytes)", document.content.len()),
        );
        Ok(())
    }
}

/// Seed a source from `config` and build the demo controller over it.
pub fn build(
    config: &DemoConfig,
    recorder: &dyn Recorder,
) -> Result<(Arc<InMemorySource<Document>>, Controller<Document>)> {
    let source = Arc::new(InMemorySource::new("documents"));
    for seed in &config.objects {
        source.apply(Document::from(seed.clone()));
    }
    source.mark_synced();

    let controller = Factory::new()
        .with_source(Arc::clone(&source))
        .with_sync(DocumentSync::default())
        .with_config(&config.controller)?
        .build(config.controller.name.clone(), recorder)?;
    Ok((source, controller))
}

/// Run the demo controller until `cancel` fires, then wait for it to stop.
pub async fn run(config: &DemoConfig, recorder: &dyn Recorder, cancel: CancellationToken) -> Result<()> {
    let (source, controller) = build(config, recorder)?;
    info!(
        controller = %controller.name(),
        documents = source.len(),
        workers = config.controller.workers,
        "Starting demo controller"
    );

    let signal = controller.shutdown_signal();
    let handle = tokio::spawn(controller.run(cancel, config.controller.workers));
    signal.wait().await;
    handle.await.context("Controller task failed")?;
    Ok(())
}
