//! Document connector: walks a directory tree and extracts one chunk per file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{StreamExt, future, stream};
use ignore::WalkBuilder;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use slmforge_shared::{ForgeError, PluginKind, RawChunk, Result, parse_params};

use crate::extract::{decode_lossy, html_to_text, sha256_hex};
use crate::{ChunkStream, Connector, ResourceStream};

/// Typed `params` for the `documents` connector.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentParams {
    /// Directory to walk.
    pub root_path: PathBuf,
    /// Extensions to include (e.g. `.txt`). `None` or empty includes every file.
    #[serde(default)]
    pub include_exts: Option<Vec<String>>,
}

/// How a file's bytes become text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    PlainText,
    Html,
}

impl DocumentFormat {
    fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            ".txt" | ".md" | ".markdown" | ".rst" | ".csv" | ".json" => Some(Self::PlainText),
            ".html" | ".htm" => Some(Self::Html),
            _ => None,
        }
    }
}

/// Walks `root_path` recursively; resource ids are file paths.
///
/// Files are visited in file-name order so repeated listings of an unchanged
/// tree are stable.
#[derive(Debug)]
pub struct DocumentConnector {
    root: PathBuf,
    include_exts: Option<Arc<HashSet<String>>>,
}

/// Directory entries buffered ahead of the consumer.
const LISTING_BUFFER: usize = 64;

impl DocumentConnector {
    /// Registry name.
    pub const NAME: &'static str = "documents";

    /// Create a connector from typed params.
    pub fn new(params: DocumentParams) -> Result<Self> {
        if !params.root_path.is_dir() {
            return Err(ForgeError::construction(
                PluginKind::Connector,
                Self::NAME,
                format!("root_path {} is not a directory", params.root_path.display()),
            ));
        }

        let include_exts = params
            .include_exts
            .filter(|exts| !exts.is_empty())
            .map(|exts| Arc::new(exts.iter().map(|e| normalize_ext(e)).collect()));

        Ok(Self {
            root: params.root_path,
            include_exts,
        })
    }

    /// Create a connector from untyped registry params.
    pub fn from_params(params: serde_json::Value) -> Result<Self> {
        Self::new(parse_params(PluginKind::Connector, Self::NAME, params)?)
    }

    async fn extract(&self, resource_id: &str) -> Result<Option<RawChunk>> {
        let path = Path::new(resource_id);
        let ext = extension_of(path);

        let Some(format) = DocumentFormat::from_ext(&ext) else {
            debug!(path = %path.display(), %ext, "no text extractor for extension, skipping");
            return Ok(None);
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ForgeError::extraction(resource_id, e))?;

        let text = match format {
            DocumentFormat::PlainText => decode_lossy(&bytes),
            DocumentFormat::Html => html_to_text(&decode_lossy(&bytes))
                .map_err(|e| ForgeError::extraction(resource_id, e))?,
        };

        if text.is_empty() {
            return Ok(None);
        }

        debug!(path = %path.display(), bytes = bytes.len(), "extracted document");

        Ok(Some(
            RawChunk::new(resource_id, format!("document:{ext}"), resource_id, text)
                .with_meta("ext", ext)
                .with_meta("bytes", bytes.len())
                .with_meta("content_sha256", sha256_hex(&bytes)),
        ))
    }
}

impl Connector for DocumentConnector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn list_resources(&self) -> ResourceStream<'_> {
        let root = self.root.clone();
        let include_exts = self.include_exts.clone();

        // The walk does blocking directory I/O, so it runs on the blocking
        // pool once the stream is first polled.
        stream::once(async move { walk_in_background(root, include_exts) })
            .flat_map(|rx| {
                stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            })
            .boxed()
    }

    fn load_resource<'a>(&'a self, resource_id: &'a str) -> ChunkStream<'a> {
        stream::once(self.extract(resource_id))
            .filter_map(|result| future::ready(result.transpose()))
            .boxed()
    }
}

/// Walk `root` on the blocking pool, sending matching file paths in order.
///
/// The walk stops early once the receiver is dropped.
fn walk_in_background(
    root: PathBuf,
    include_exts: Option<Arc<HashSet<String>>>,
) -> mpsc::Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel(LISTING_BUFFER);

    tokio::task::spawn_blocking(move || {
        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let item = match entry {
                Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                    let path = entry.into_path();
                    let accepted = include_exts
                        .as_deref()
                        .is_none_or(|exts| exts.contains(&extension_of(&path)));
                    if !accepted {
                        continue;
                    }
                    Ok(path.to_string_lossy().into_owned())
                }
                Ok(_) => continue,
                Err(e) => Err(ForgeError::extraction(root.display().to_string(), e)),
            };
            if tx.blocking_send(item).is_err() {
                debug!(root = %root.display(), "listing dropped, stopping walk");
                return;
            }
        }
    });

    rx
}

/// Lowercased extension with a leading dot, or empty.
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn normalize_ext(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}
