//! Continuation task: predict the next segment of a chunk.
//!
//! Segments are grouped by the chunk they were cut from (groups in first-seen
//! order), put back in `chunk_idx` order, and every consecutive pair becomes
//! one example. One resource may hold many chunks, e.g. one per table row,
//! and their segments are never paired with each other.

use std::collections::HashMap;

use serde::Deserialize;
use slmforge_shared::{
    ForgeError, Metadata, PluginKind, RawChunk, Result, TrainingExample, parse_params,
};

use super::{ChunkIter, ExampleIter, TaskBuilder};
use crate::chunker::{CHUNK_IDX_KEY, parent_id};

/// Metadata key holding the target segment's index.
pub const TARGET_CHUNK_IDX_KEY: &str = "target_chunk_idx";

/// Typed `params` for the `continuation` builder.
#[derive(Debug, Clone, Deserialize)]
pub struct ContinuationParams {
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

fn default_instruction() -> String {
    "Continue the following text.".to_string()
}

/// Pairs each segment with the one that follows it in the same chunk.
#[derive(Debug, Clone)]
pub struct ContinuationBuilder {
    params: ContinuationParams,
}

impl ContinuationBuilder {
    /// Registry name.
    pub const NAME: &'static str = "continuation";

    pub fn new(params: ContinuationParams) -> Self {
        Self { params }
    }

    /// Create a builder from untyped registry params.
    pub fn from_params(params: serde_json::Value) -> Result<Self> {
        Ok(Self::new(parse_params(PluginKind::TaskBuilder, Self::NAME, params)?))
    }

    fn example(&self, current: &(u64, RawChunk), next: &(u64, RawChunk)) -> TrainingExample {
        let mut metadata: Metadata = current.1.metadata.clone();
        metadata.insert(TARGET_CHUNK_IDX_KEY.into(), next.0.into());

        TrainingExample {
            input_text: format!("{}\n\n{}", self.params.instruction, current.1.content),
            target_text: next.1.content.clone(),
            metadata,
        }
    }
}

/// Group segments by parent chunk, each group sorted by segment index.
fn group_by_parent(chunks: ChunkIter<'_>) -> Result<Vec<Vec<(u64, RawChunk)>>> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<(u64, RawChunk)>> = Vec::new();

    for chunk in chunks {
        let idx = chunk
            .metadata
            .get(CHUNK_IDX_KEY)
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                ForgeError::TaskBuilder(format!(
                    "chunk {} has no {CHUNK_IDX_KEY}; continuation needs segmented input",
                    chunk.id
                ))
            })?;

        let slot = *slots.entry(parent_id(&chunk.id).to_string()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push((idx, chunk));
    }

    for group in &mut groups {
        group.sort_by_key(|(idx, _)| *idx);
    }

    Ok(groups)
}

impl TaskBuilder for ContinuationBuilder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires_materialization(&self) -> bool {
        true
    }

    fn build_examples<'a>(&'a self, chunks: ChunkIter<'a>) -> ExampleIter<'a> {
        let groups = match group_by_parent(chunks) {
            Ok(groups) => groups,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        tracing::debug!(groups = groups.len(), "grouped segments for continuation");

        Box::new(groups.into_iter().flat_map(move |group| {
            group
                .windows(2)
                .map(|pair| Ok::<_, ForgeError>(self.example(&pair[0], &pair[1])))
                .collect::<Vec<_>>()
        }))
    }
}
