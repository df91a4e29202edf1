use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use slmforge_connectors::{ChunkStream, Connector, ResourceStream};
use slmforge_core::handoff::{DATASET_FILE, MANIFEST_FILE};
use slmforge_core::{
    DatasetWriter, DryRun, Pipeline, PipelineState, PluginRegistry, ProgressReporter, RunReport,
    SilentProgress, SkippedResource,
};
use slmforge_shared::{
    ForgeError, PipelineConfig, PluginKind, PluginSpec, RawChunk, ResourceErrorPolicy, Result,
    parse_params,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// In-memory connector driven entirely by its params.
#[derive(Debug, Deserialize)]
struct Scripted {
    #[serde(default)]
    resources: Vec<ScriptedResource>,
}

#[derive(Debug, Deserialize)]
struct ScriptedResource {
    id: String,
    #[serde(default)]
    chunks: Vec<String>,
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    hang: bool,
}

impl Connector for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn list_resources(&self) -> ResourceStream<'_> {
        stream::iter(self.resources.iter().map(|r| Ok(r.id.clone()))).boxed()
    }

    fn load_resource<'a>(&'a self, resource_id: &'a str) -> ChunkStream<'a> {
        let Some(resource) = self.resources.iter().find(|r| r.id == resource_id) else {
            return stream::iter([Err(ForgeError::unknown_resource(resource_id))]).boxed();
        };
        if resource.hang {
            return stream::pending().boxed();
        }

        let mut items: Vec<Result<RawChunk>> = resource
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Ok(RawChunk::new(format!("{resource_id}:{i}"), "scripted", resource_id, c.as_str())
                    .with_meta("origin", "fixture"))
            })
            .collect();
        if resource.fail {
            items.push(Err(ForgeError::extraction(resource_id, "simulated outage")));
        }
        stream::iter(items).boxed()
    }
}

fn plugins() -> Arc<PluginRegistry> {
    let plugins = PluginRegistry::with_builtins();
    plugins.connectors.register("scripted", |params| {
        let scripted: Scripted = parse_params(PluginKind::Connector, "scripted", params)?;
        Ok(Box::new(scripted) as Box<dyn Connector>)
    });
    Arc::new(plugins)
}

fn temp_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("slmforge-{label}-{}", Uuid::now_v7()))
}

fn config(connectors: Vec<PluginSpec>, max_chars: usize, output_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::example();
    config.connectors = connectors;
    config.processing.max_chars = max_chars;
    config.training.output_dir = output_dir.to_string_lossy().into_owned();
    config
}

fn scripted(resources: serde_json::Value) -> PluginSpec {
    PluginSpec::new("scripted", serde_json::json!({ "resources": resources }))
}

/// Records every callback it receives.
#[derive(Default)]
struct Recorder {
    phases: Mutex<Vec<PipelineState>>,
    loaded: Mutex<Vec<String>>,
    skipped: Mutex<Vec<SkippedResource>>,
    cancel_on_load: Option<CancellationToken>,
}

impl ProgressReporter for Recorder {
    fn phase(&self, state: PipelineState) {
        self.phases.lock().expect("lock").push(state);
    }

    fn resource_loaded(&self, _connector: &str, resource_id: &str, _chunks: usize) {
        self.loaded.lock().expect("lock").push(resource_id.to_string());
        if let Some(token) = &self.cancel_on_load {
            token.cancel();
        }
    }

    fn resource_skipped(&self, skipped: &SkippedResource) {
        self.skipped.lock().expect("lock").push(skipped.clone());
    }

    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn documents_are_cleaned_and_segmented() {
    let docs = temp_dir("docs");
    std::fs::create_dir_all(&docs).expect("mkdir");
    std::fs::write(docs.join("note.txt"), "Hello   world\n\n\nFoo").expect("write");
    std::fs::write(docs.join("skip.md"), "not included").expect("write");

    let out = temp_dir("out");
    let spec = PluginSpec::new(
        "documents",
        serde_json::json!({ "root_path": docs, "include_exts": [".txt"] }),
    );
    let pipeline = Pipeline::new(config(vec![spec], 10, &out), plugins()).expect("pipeline");

    let outcome = pipeline
        .ingest(&CancellationToken::new(), &SilentProgress)
        .await
        .expect("ingest");
    let contents: Vec<&str> = outcome.segments.iter().map(|s| s.content.as_str()).collect();
    assert_eq!(contents, vec!["Hello worl", "d Foo"]);
    for segment in &outcome.segments {
        assert_eq!(segment.source_type, "document:.txt");
        assert_eq!(segment.metadata["ext"], ".txt");
    }

    let report = pipeline.run(&DatasetWriter, &SilentProgress).await.expect("run");
    assert_eq!(report.examples, 2);
    assert_eq!(report.stats.segments, 2);

    let dataset = std::fs::read_to_string(out.join(DATASET_FILE)).expect("dataset");
    assert_eq!(dataset.lines().count(), 2);
    assert!(dataset.contains("Hello worl"));
    assert!(out.join(MANIFEST_FILE).exists());

    let _ = std::fs::remove_dir_all(&docs);
    let _ = std::fs::remove_dir_all(&out);
}

#[tokio::test]
async fn chunks_from_all_connectors_are_aggregated() {
    let out = temp_dir("out");
    let busy = scripted(serde_json::json!([
        { "id": "r1", "chunks": ["one"] },
        { "id": "r2", "chunks": ["two"] },
        { "id": "r3", "chunks": ["three"] },
    ]));
    let empty = scripted(serde_json::json!([]));

    for connectors in [vec![busy.clone(), empty.clone()], vec![empty, busy]] {
        let pipeline = Pipeline::new(config(connectors, 100, &out), plugins()).expect("pipeline");
        let outcome = pipeline
            .ingest(&CancellationToken::new(), &SilentProgress)
            .await
            .expect("ingest");
        assert_eq!(outcome.stats.raw_chunks, 3);
        assert_eq!(outcome.segments.len(), 3);
    }
}

#[tokio::test]
async fn database_rejects_unknown_resource_kinds() {
    let plugins = plugins();
    let connector = plugins
        .connectors
        .create(
            "database",
            serde_json::json!({ "conn_str": "unused.db", "tables": ["users"] }),
        )
        .expect("connector");

    let ids: Vec<String> = connector
        .list_resources()
        .map(|r| r.expect("id"))
        .collect()
        .await;
    assert_eq!(ids, vec!["table:users"]);

    let first = connector.load_resource("bogus:users").next().await;
    assert!(matches!(first, Some(Err(ForgeError::UnknownResourceKind { .. }))));
}

#[tokio::test]
async fn summarization_keeps_metadata() {
    let out = temp_dir("out");
    let pipeline = Pipeline::new(config(vec![scripted(serde_json::json!([]))], 100, &out), plugins())
        .expect("pipeline");
    let builder = pipeline.task_builder().expect("builder");

    let chunks = vec![
        RawChunk::new("a::chunk0", "database", "table:users", "alice likes rust")
            .with_meta("row_index", 0)
            .with_meta("chunk_idx", 0),
        RawChunk::new("b::chunk0", "document:.txt", "/docs/b.txt", "bob likes go")
            .with_meta("chunk_idx", 0),
    ];
    let examples = pipeline
        .build_examples(builder.as_ref(), chunks.clone())
        .expect("examples");

    assert_eq!(examples.len(), 2);
    for (example, chunk) in examples.iter().zip(&chunks) {
        assert_eq!(example.metadata, chunk.metadata);
        assert!(example.input_text.contains(&chunk.content));
    }
}

// ---------------------------------------------------------------------------
// Resilience and cancellation
// ---------------------------------------------------------------------------

fn flaky() -> PluginSpec {
    scripted(serde_json::json!([
        { "id": "ok-1", "chunks": ["first resource"] },
        { "id": "broken", "chunks": ["partial"], "fail": true },
        { "id": "ok-2", "chunks": ["second resource"] },
    ]))
}

#[tokio::test]
async fn skip_policy_continues_past_failures() {
    let out = temp_dir("out");
    let pipeline = Pipeline::new(config(vec![flaky()], 100, &out), plugins()).expect("pipeline");
    let recorder = Recorder::default();

    let report = pipeline.run(&DryRun, &recorder).await.expect("run");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].resource_id.as_deref(), Some("broken"));
    assert_eq!(report.stats.resources_loaded, 2);
    // The chunk emitted before the failure is kept.
    assert_eq!(report.examples, 3);
    assert!(report.handoff.dry_run);
    assert_eq!(recorder.skipped.lock().expect("lock").len(), 1);
    assert!(!out.exists());

    let phases = recorder.phases.lock().expect("lock").clone();
    assert_eq!(
        phases,
        vec![
            PipelineState::Initialized,
            PipelineState::ConnectorsReady,
            PipelineState::ChunksExtracted,
            PipelineState::Cleaned,
            PipelineState::Chunked,
            PipelineState::ExamplesBuilt,
            PipelineState::Delegated,
        ]
    );
}

#[tokio::test]
async fn abort_policy_fails_the_run() {
    let out = temp_dir("out");
    let mut config = config(vec![flaky()], 100, &out);
    config.processing.on_resource_error = ResourceErrorPolicy::Abort;
    let pipeline = Pipeline::new(config, plugins()).expect("pipeline");

    let err = pipeline.run(&DatasetWriter, &SilentProgress).await.expect_err("abort");
    assert!(matches!(err, ForgeError::Extraction { ref resource_id, .. } if resource_id == "broken"));
    assert!(!out.join(DATASET_FILE).exists());
}

#[tokio::test]
async fn unknown_plugin_fails_before_extraction() {
    let out = temp_dir("out");
    let mut config = config(vec![flaky()], 100, &out);
    config.task_builder = PluginSpec::new("translation", serde_json::Value::Null);
    let pipeline = Pipeline::new(config, plugins()).expect("pipeline");
    let recorder = Recorder::default();

    let err = pipeline.run(&DatasetWriter, &recorder).await.expect_err("unknown");
    assert!(matches!(err, ForgeError::UnknownPlugin { kind: PluginKind::TaskBuilder, .. }));
    assert!(recorder.loaded.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn cancellation_stops_the_run_without_handoff() {
    let out = temp_dir("out");
    let mut config = config(
        vec![scripted(serde_json::json!([
            { "id": "quick", "chunks": ["done fast"] },
            { "id": "stuck", "hang": true },
        ]))],
        100,
        &out,
    );
    config.processing.concurrency = 2;
    let pipeline = Pipeline::new(config, plugins()).expect("pipeline");

    let token = CancellationToken::new();
    let recorder = Recorder {
        cancel_on_load: Some(token.clone()),
        ..Recorder::default()
    };

    let err = pipeline
        .run_with_cancel(token, &DatasetWriter, &recorder)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, ForgeError::Cancelled { chunks_extracted: 1 }));
    assert_eq!(*recorder.loaded.lock().expect("lock"), vec!["quick".to_string()]);
    assert!(!out.exists());
}
