//! Remote server connector.
//!
//! Only `server_type = "http"` is implemented: each configured URL is one
//! resource, fetched with a GET and converted to text.

use std::time::Duration;

use futures::{StreamExt, future, stream};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use slmforge_shared::{ForgeError, PluginKind, RawChunk, Result, parse_params};

use crate::extract::{html_to_text, page_title};
use crate::{ChunkStream, Connector, ResourceStream};

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("slmforge/", env!("CARGO_PKG_VERSION"));

/// Server types recognised in configuration but without a client here.
const UNSUPPORTED_TYPES: &[&str] = &["ftp", "sftp", "sharepoint", "jira", "confluence"];

/// Typed `params` for the `server` connector.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerParams {
    /// Protocol / product family, e.g. `http`.
    pub server_type: String,
    /// Settings for the chosen server type.
    #[serde(default)]
    pub config: serde_json::Value,
}

/// `config` table for `server_type = "http"`.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub urls: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Fetches pages over HTTP(S). Resource ids are the URLs themselves.
#[derive(Debug)]
pub struct ServerConnector {
    server_type: String,
    urls: Vec<String>,
    client: Client,
}

/// Every failure while building the connector, the HTTP client included.
fn construction_error(msg: impl std::fmt::Display) -> ForgeError {
    ForgeError::construction(PluginKind::Connector, ServerConnector::NAME, msg)
}

impl ServerConnector {
    /// Registry name.
    pub const NAME: &'static str = "server";

    /// Create a connector from typed params.
    pub fn new(params: ServerParams) -> Result<Self> {
        let server_type = params.server_type.trim().to_lowercase();
        let settings: HttpSettings = match server_type.as_str() {
            "http" => parse_params(PluginKind::Connector, Self::NAME, params.config)?,
            other if UNSUPPORTED_TYPES.contains(&other) => {
                return Err(construction_error(format!(
                    "server_type '{other}' is not supported yet"
                )));
            }
            other => return Err(construction_error(format!("unknown server_type '{other}'"))),
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| construction_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            server_type,
            urls: settings.urls,
            client,
        })
    }

    /// Create a connector from untyped registry params.
    pub fn from_params(params: serde_json::Value) -> Result<Self> {
        Self::new(parse_params(PluginKind::Connector, Self::NAME, params)?)
    }

    async fn fetch(&self, resource_id: &str) -> Result<Option<RawChunk>> {
        let url = Url::parse(resource_id)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| ForgeError::unknown_resource(resource_id))?;

        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ForgeError::extraction(resource_id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForgeError::extraction(resource_id, format!("HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| ForgeError::extraction(resource_id, format!("body read failed: {e}")))?;

        let is_html = content_type.contains("html") || body.trim_start().starts_with('<');
        let (text, title) = if is_html {
            let text = html_to_text(&body).map_err(|e| ForgeError::extraction(resource_id, e))?;
            (text, page_title(&body))
        } else {
            (body, None)
        };

        if text.trim().is_empty() {
            return Ok(None);
        }

        let mut chunk = RawChunk::new(
            resource_id,
            format!("server:{}", self.server_type),
            resource_id,
            text,
        )
        .with_meta("server_type", self.server_type.clone())
        .with_meta("status", status.as_u16())
        .with_meta("content_type", content_type);
        if let Some(title) = title {
            chunk = chunk.with_meta("title", title);
        }

        Ok(Some(chunk))
    }
}

impl Connector for ServerConnector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn list_resources(&self) -> ResourceStream<'_> {
        stream::iter(self.urls.iter().cloned().map(Ok)).boxed()
    }

    fn load_resource<'a>(&'a self, resource_id: &'a str) -> ChunkStream<'a> {
        stream::once(self.fetch(resource_id))
            .filter_map(|result| future::ready(result.transpose()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(urls: Vec<String>) -> ServerConnector {
        ServerConnector::new(ServerParams {
            server_type: "http".into(),
            config: serde_json::json!({ "urls": urls }),
        })
        .expect("connector")
    }

    #[tokio::test]
    async fn fetches_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guide"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html><head><title>Guide</title></head><body><h1>Setup</h1><p>Run the installer.</p></body></html>",
                "text/html; charset=utf-8",
            ))
            .mount(&server)
            .await;

        let url = format!("{}/guide", server.uri());
        let conn = connector(vec![url.clone()]);

        let ids: Vec<String> = conn.list_resources().try_collect().await.expect("list");
        assert_eq!(ids, vec![url.clone()]);

        let chunks: Vec<RawChunk> = conn.load_resource(&url).try_collect().await.expect("load");
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.source_type, "server:http");
        assert_eq!(chunk.source_uri, url);
        assert!(chunk.content.contains("Run the installer."));
        assert!(!chunk.content.contains("<p>"));
        assert_eq!(chunk.metadata["status"], 200);
        assert_eq!(chunk.metadata["title"], "Guide");
    }

    #[tokio::test]
    async fn plain_text_passes_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("just text", "text/plain"))
            .mount(&server)
            .await;

        let url = format!("{}/notes.txt", server.uri());
        let conn = connector(vec![url.clone()]);
        let chunks: Vec<RawChunk> = conn.load_resource(&url).try_collect().await.expect("load");
        assert_eq!(chunks[0].content, "just text");
        assert!(!chunks[0].metadata.contains_key("title"));
    }

    #[tokio::test]
    async fn error_status_is_extraction_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing", server.uri());
        let conn = connector(vec![url.clone()]);
        let result: Result<Vec<RawChunk>> = conn.load_resource(&url).try_collect().await;
        let err = result.expect_err("404");
        assert!(matches!(err, ForgeError::Extraction { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn unparsable_url_is_unknown_resource() {
        let conn = connector(vec![]);
        for id in ["not a url", "ftp://example.com/file"] {
            let result: Result<Vec<RawChunk>> = conn.load_resource(id).try_collect().await;
            assert!(matches!(result, Err(ForgeError::UnknownResourceKind { .. })));
        }
    }

    #[test]
    fn unsupported_server_types_fail_construction() {
        for server_type in ["sftp", "jira", "gopher"] {
            let err = ServerConnector::new(ServerParams {
                server_type: server_type.into(),
                config: serde_json::Value::Null,
            })
            .expect_err("unsupported");
            assert!(matches!(err, ForgeError::PluginConstruction { .. }));
        }
    }

    #[test]
    fn http_requires_urls() {
        let err = ServerConnector::new(ServerParams {
            server_type: "http".into(),
            config: serde_json::json!({ "timeout_secs": 5 }),
        })
        .expect_err("urls missing");
        assert!(err.to_string().contains("urls"));
    }

    #[test]
    fn client_errors_are_construction_errors() {
        let err = construction_error("failed to build HTTP client: no TLS backend");
        assert!(matches!(
            err,
            ForgeError::PluginConstruction { kind: PluginKind::Connector, ref name, .. } if name == "server"
        ));
    }
}
