//! Database connector: streams table rows and query results as text.
//!
//! Backed by libSQL, so `conn_str` is a local SQLite/libSQL database path
//! (or `:memory:`). The connection is opened on first use.

use std::sync::LazyLock;

use futures::{StreamExt, future, stream};
use libsql::{Connection, Database, Rows, Value};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use slmforge_shared::{ForgeError, PluginKind, RawChunk, Result, parse_params};

use crate::{ChunkStream, Connector, ResourceStream};

/// Typed `params` for the `database` connector.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseParams {
    /// Database path.
    pub conn_str: String,
    /// Tables dumped with `SELECT *`.
    #[serde(default)]
    pub tables: Vec<String>,
    /// Arbitrary read queries.
    #[serde(default)]
    pub queries: Vec<String>,
    /// Rows read per resource at most.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_max_rows() -> usize {
    10_000
}

/// Plain (optionally schema-qualified) SQL identifier.
static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// Resource ids are `table:<name>` and `query:<index>`; each row becomes one chunk.
pub struct DatabaseConnector {
    params: DatabaseParams,
    db: OnceCell<(Database, Connection)>,
}

impl std::fmt::Debug for DatabaseConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConnector")
            .field("conn_str", &self.params.conn_str)
            .field("tables", &self.params.tables)
            .field("queries", &self.params.queries.len())
            .finish_non_exhaustive()
    }
}

/// Position of a row stream within one resource.
enum RowCursor {
    Pending(String),
    Open {
        rows: Rows,
        columns: Vec<String>,
        index: usize,
    },
    Done,
}

impl DatabaseConnector {
    /// Registry name.
    pub const NAME: &'static str = "database";

    /// Create a connector from typed params.
    pub fn new(params: DatabaseParams) -> Result<Self> {
        if params.conn_str.trim().is_empty() {
            return Err(ForgeError::construction(
                PluginKind::Connector,
                Self::NAME,
                "conn_str is empty",
            ));
        }
        if let Some(bad) = params.tables.iter().find(|t| !IDENT_RE.is_match(t)) {
            return Err(ForgeError::construction(
                PluginKind::Connector,
                Self::NAME,
                format!("invalid table name '{bad}'"),
            ));
        }
        if params.max_rows == 0 {
            return Err(ForgeError::construction(
                PluginKind::Connector,
                Self::NAME,
                "max_rows must be positive",
            ));
        }

        Ok(Self {
            params,
            db: OnceCell::new(),
        })
    }

    /// Create a connector from untyped registry params.
    pub fn from_params(params: serde_json::Value) -> Result<Self> {
        Self::new(parse_params(PluginKind::Connector, Self::NAME, params)?)
    }

    /// Map a resource id to the SQL it stands for.
    fn resolve(&self, resource_id: &str) -> Result<String> {
        let unknown = || ForgeError::unknown_resource(resource_id);
        let (kind, ident) = resource_id.split_once(':').ok_or_else(unknown)?;

        match kind {
            "table" if IDENT_RE.is_match(ident) => Ok(format!("SELECT * FROM {ident}")),
            "query" => {
                let index: usize = ident.parse().map_err(|_| unknown())?;
                self.params.queries.get(index).cloned().ok_or_else(unknown)
            }
            _ => Err(unknown()),
        }
    }

    async fn connection(&self) -> Result<&Connection> {
        let (_, conn) = self
            .db
            .get_or_try_init(|| async {
                let db = libsql::Builder::new_local(&self.params.conn_str)
                    .build()
                    .await
                    .map_err(|e| ForgeError::Database(e.to_string()))?;
                let conn = db.connect().map_err(|e| ForgeError::Database(e.to_string()))?;
                debug!(conn_str = %self.params.conn_str, "opened database");
                Ok::<_, ForgeError>((db, conn))
            })
            .await?;
        Ok(conn)
    }

    async fn open_rows(&self, resource_id: &str, sql: &str) -> Result<(Rows, Vec<String>)> {
        let conn = self.connection().await?;
        let rows = conn
            .query(sql, ())
            .await
            .map_err(|e| ForgeError::extraction(resource_id, e))?;

        let columns = (0..rows.column_count())
            .map(|i| rows.column_name(i).unwrap_or_default().to_string())
            .collect();

        Ok((rows, columns))
    }

    /// Pull the next row of `resource_id` and turn it into a chunk.
    async fn advance(
        &self,
        resource_id: &str,
        cursor: RowCursor,
    ) -> Option<(Result<RawChunk>, RowCursor)> {
        let (mut rows, columns, index) = match cursor {
            RowCursor::Pending(sql) => match self.open_rows(resource_id, &sql).await {
                Ok((rows, columns)) => (rows, columns, 0),
                Err(e) => return Some((Err(e), RowCursor::Done)),
            },
            RowCursor::Open {
                rows,
                columns,
                index,
            } => (rows, columns, index),
            RowCursor::Done => return None,
        };

        if index >= self.params.max_rows {
            debug!(resource_id, max_rows = self.params.max_rows, "row limit reached");
            return None;
        }

        match rows.next().await {
            Ok(Some(row)) => {
                let chunk = row_chunk(resource_id, index, &columns, &row);
                Some((
                    chunk,
                    RowCursor::Open {
                        rows,
                        columns,
                        index: index + 1,
                    },
                ))
            }
            Ok(None) => None,
            Err(e) => Some((Err(ForgeError::extraction(resource_id, e)), RowCursor::Done)),
        }
    }
}

impl Connector for DatabaseConnector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn list_resources(&self) -> ResourceStream<'_> {
        let tables = self.params.tables.iter().map(|t| Ok(format!("table:{t}")));
        let queries = (0..self.params.queries.len()).map(|i| Ok(format!("query:{i}")));
        stream::iter(tables.chain(queries)).boxed()
    }

    fn load_resource<'a>(&'a self, resource_id: &'a str) -> ChunkStream<'a> {
        let sql = match self.resolve(resource_id) {
            Ok(sql) => sql,
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };

        stream::unfold(RowCursor::Pending(sql), move |cursor| {
            self.advance(resource_id, cursor)
        })
        .boxed()
    }
}

fn row_chunk(
    resource_id: &str,
    index: usize,
    columns: &[String],
    row: &libsql::Row,
) -> Result<RawChunk> {
    let mut values = Vec::with_capacity(columns.len());
    for i in 0..columns.len() {
        let value = row
            .get_value(i as i32)
            .map_err(|e| ForgeError::extraction(resource_id, e))?;
        values.push(render_value(value));
    }

    Ok(RawChunk::new(
        format!("{resource_id}:{index}"),
        "database",
        resource_id,
        values.join(" "),
    )
    .with_meta("row_index", index)
    .with_meta("columns", columns.to_vec()))
}

fn render_value(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
