//! Summarization task: one prompt per segment, placeholder target.

use serde::Deserialize;
use slmforge_shared::{ForgeError, PluginKind, Result, TrainingExample, parse_params};

use super::{ChunkIter, ExampleIter, TaskBuilder};

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a domain expert. Summarize the key points from the context.";

/// Typed `params` for the `summarization` builder.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizationParams {
    /// Instructional preamble placed before the context.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Target text used until real summaries are available.
    #[serde(default = "default_placeholder_target")]
    pub placeholder_target: String,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_placeholder_target() -> String {
    "DUMMY_LABEL".to_string()
}

impl Default for SummarizationParams {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            placeholder_target: default_placeholder_target(),
        }
    }
}

/// Streams one example per segment; metadata is forwarded unchanged.
#[derive(Debug, Clone, Default)]
pub struct SummarizationBuilder {
    params: SummarizationParams,
}

impl SummarizationBuilder {
    /// Registry name.
    pub const NAME: &'static str = "summarization";

    pub fn new(params: SummarizationParams) -> Self {
        Self { params }
    }

    /// Create a builder from untyped registry params.
    pub fn from_params(params: serde_json::Value) -> Result<Self> {
        Ok(Self::new(parse_params(PluginKind::TaskBuilder, Self::NAME, params)?))
    }

    fn prompt(&self, content: &str) -> String {
        format!(
            "{}\n\nContext:\n{content}\n\nTask: Summarize the context in a concise way.",
            self.params.system_prompt
        )
    }
}

impl TaskBuilder for SummarizationBuilder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn build_examples<'a>(&'a self, chunks: ChunkIter<'a>) -> ExampleIter<'a> {
        Box::new(chunks.map(move |chunk| {
            Ok::<_, ForgeError>(TrainingExample {
                input_text: self.prompt(&chunk.content),
                target_text: self.params.placeholder_target.clone(),
                metadata: chunk.metadata,
            })
        }))
    }
}
