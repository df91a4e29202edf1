//! Bounded producer/consumer ingestion: extract → clean → segment.
//!
//! A producer task walks the connectors in configuration order and their
//! resources in listing order, spawning one extraction task per resource.
//! At most `concurrency` extractions run at once; they feed a bounded channel
//! that the caller's task drains, cleaning and segmenting each chunk as it
//! arrives. Chunks of one resource always arrive in order. With
//! `concurrency = 1` the overall order is connector, then resource, then
//! chunk order.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use slmforge_connectors::Connector;
use slmforge_processing::{clean, segment};
use slmforge_shared::{ForgeError, ProcessingConfig, RawChunk, ResourceErrorPolicy, Result};

use crate::pipeline::ProgressReporter;

/// Counters collected while ingesting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Resources whose extraction ran to completion.
    pub resources_loaded: usize,
    /// Chunks received from connectors.
    pub raw_chunks: usize,
    /// Chunks left after cleaning.
    pub cleaned_chunks: usize,
    /// Chunks dropped because cleaning left nothing.
    pub dropped_empty: usize,
    /// Segments produced.
    pub segments: usize,
}

/// A resource (or a whole listing) that failed under the `skip` policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedResource {
    pub connector: String,
    /// `None` when listing the connector's resources failed.
    pub resource_id: Option<String>,
    pub error: String,
}

/// Result of one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Processed segments, ready for a task builder.
    pub segments: Vec<RawChunk>,
    pub stats: IngestStats,
    pub skipped: Vec<SkippedResource>,
    /// Set when the caller's token fired; `segments` then holds a partial result.
    pub cancelled: bool,
}

/// Message from extraction tasks to the consumer.
enum IngestEvent {
    Chunk(RawChunk),
    Loaded {
        connector: String,
        resource_id: String,
        chunks: usize,
    },
    Failed {
        connector: String,
        resource_id: Option<String>,
        error: ForgeError,
    },
}

/// Run extraction over `connectors` and clean/segment everything they emit.
///
/// Under [`ResourceErrorPolicy::Abort`] the first failure stops all extraction
/// and is returned. Cancelling `cancel` stops extraction and returns what was
/// processed so far with `cancelled` set.
#[instrument(skip_all, fields(connectors = connectors.len(), concurrency = settings.concurrency))]
pub async fn ingest(
    connectors: Vec<Arc<dyn Connector>>,
    settings: &ProcessingConfig,
    cancel: &CancellationToken,
    progress: &dyn ProgressReporter,
) -> Result<IngestOutcome> {
    let max_chars = NonZeroUsize::new(settings.max_chars)
        .ok_or_else(|| ForgeError::config("processing.max_chars must be a positive integer"))?;

    // Child token: an abort stops extraction without marking the run cancelled.
    let extraction = cancel.child_token();
    let (tx, mut rx) = mpsc::channel(settings.queue_capacity.max(1));

    let producer = tokio::spawn(produce(
        connectors,
        settings.concurrency.max(1),
        tx,
        extraction.clone(),
    ));

    let mut outcome = IngestOutcome::default();
    let mut abort_error: Option<ForgeError> = None;

    while let Some(event) = rx.recv().await {
        match event {
            IngestEvent::Chunk(raw) => {
                outcome.stats.raw_chunks += 1;
                let Some(cleaned) = clean(raw) else {
                    outcome.stats.dropped_empty += 1;
                    continue;
                };
                outcome.stats.cleaned_chunks += 1;

                let before = outcome.segments.len();
                outcome.segments.extend(segment(&cleaned, max_chars));
                outcome.stats.segments += outcome.segments.len() - before;
            }
            IngestEvent::Loaded {
                connector,
                resource_id,
                chunks,
            } => {
                outcome.stats.resources_loaded += 1;
                debug!(%connector, %resource_id, chunks, "resource loaded");
                progress.resource_loaded(&connector, &resource_id, chunks);
            }
            IngestEvent::Failed {
                connector,
                resource_id,
                error,
            } => match settings.on_resource_error {
                ResourceErrorPolicy::Skip => {
                    warn!(%connector, resource_id = ?resource_id, error = %error, "skipping failed resource");
                    let skipped = SkippedResource {
                        connector,
                        resource_id,
                        error: error.to_string(),
                    };
                    progress.resource_skipped(&skipped);
                    outcome.skipped.push(skipped);
                }
                ResourceErrorPolicy::Abort => {
                    if abort_error.is_none() {
                        warn!(%connector, resource_id = ?resource_id, error = %error, "aborting ingestion");
                        extraction.cancel();
                        abort_error = Some(error);
                    }
                }
            },
        }
    }

    if let Err(e) = producer.await {
        warn!(error = %e, "ingestion producer task failed");
    }

    if let Some(error) = abort_error {
        return Err(error);
    }

    outcome.cancelled = cancel.is_cancelled();
    info!(
        resources = outcome.stats.resources_loaded,
        raw_chunks = outcome.stats.raw_chunks,
        segments = outcome.stats.segments,
        skipped = outcome.skipped.len(),
        cancelled = outcome.cancelled,
        "ingestion finished"
    );

    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Enumerate resources and spawn one extraction task per resource.
async fn produce(
    connectors: Vec<Arc<dyn Connector>>,
    concurrency: usize,
    tx: mpsc::Sender<IngestEvent>,
    token: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut spawned: HashMap<Id, (String, String)> = HashMap::new();

    'connectors: for connector in connectors {
        let name = connector.name().to_string();
        let mut resources = connector.list_resources();

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => break 'connectors,
                next = resources.next() => next,
            };

            let resource_id = match next {
                Some(Ok(resource_id)) => resource_id,
                Some(Err(error)) => {
                    let failed = IngestEvent::Failed {
                        connector: name.clone(),
                        resource_id: None,
                        error,
                    };
                    // A bad entry does not end the listing.
                    if tx.send(failed).await.is_err() {
                        break 'connectors;
                    }
                    continue;
                }
                None => break,
            };

            // Taking the permit here, before spawning, keeps tasks starting
            // in listing order.
            let permit = tokio::select! {
                biased;
                () = token.cancelled() => break 'connectors,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'connectors,
                },
            };

            let handle = tasks.spawn(extract_resource(
                Arc::clone(&connector),
                name.clone(),
                resource_id.clone(),
                tx.clone(),
                token.clone(),
                permit,
            ));
            spawned.insert(handle.id(), (name.clone(), resource_id));
        }
    }

    while let Some(joined) = tasks.join_next().await {
        let Err(e) = joined else { continue };
        let (connector, resource_id) = spawned.remove(&e.id()).unwrap_or_default();
        warn!(%connector, %resource_id, error = %e, "extraction task failed");
        if !e.is_panic() {
            continue;
        }
        let failed = IngestEvent::Failed {
            error: ForgeError::extraction(&resource_id, format!("extraction task panicked: {e}")),
            connector,
            resource_id: Some(resource_id),
        };
        if tx.send(failed).await.is_err() {
            break;
        }
    }
}

/// Stream one resource's chunks into the channel.
async fn extract_resource(
    connector: Arc<dyn Connector>,
    name: String,
    resource_id: String,
    tx: mpsc::Sender<IngestEvent>,
    token: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let result = {
        let mut chunks = connector.load_resource(&resource_id);
        let mut count = 0usize;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break None,
                next = chunks.next() => match next {
                    Some(Ok(chunk)) => {
                        count += 1;
                        if tx.send(IngestEvent::Chunk(chunk)).await.is_err() {
                            break None;
                        }
                    }
                    Some(Err(error)) => break Some(Err(error)),
                    None => break Some(Ok(count)),
                },
            }
        }
    };

    let event = match result {
        Some(Ok(chunks)) => IngestEvent::Loaded {
            connector: name,
            resource_id,
            chunks,
        },
        Some(Err(error)) => IngestEvent::Failed {
            connector: name,
            resource_id: Some(resource_id),
            error,
        },
        None => {
            debug!(connector = %name, %resource_id, "extraction cancelled");
            return;
        }
    };

    // The receiver only goes away once ingestion is over.
    let _ = tx.send(event).await;
}
