//! `database` node — run one SQL query against a caller-supplied Postgres.
//!
//! Each run opens a fresh connection from `connectionString`, executes
//! `query`, and closes the connection on every path. Only the current
//! query's results are returned; no server-side state leaks between runs.

use async_trait::async_trait;
use engine::{Context, Node};
use serde_json::{json, Map, Value};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo};
use tracing::warn;

use crate::traits::{require_str, resolved_data};
use crate::{HandlerError, NodeHandler};

pub struct DatabaseNode;

#[async_trait]
impl NodeHandler for DatabaseNode {
    async fn handle(&self, node: &Node, context: &Context) -> Result<Value, HandlerError> {
        let data = resolved_data(node, context);
        let connection_string = require_str(&data, "connectionString")?;
        let query = require_str(&data, "query")?;

        let mut connection = PgConnection::connect(connection_string)
            .await
            .map_err(|e| HandlerError::Io(e.to_string()))?;

        let result = run_query(&mut connection, query).await;

        // Close regardless of the query outcome.
        if let Err(close_err) = connection.close().await {
            warn!(node_id = %node.id, "connection close failed: {close_err}");
        }

        result
    }
}

async fn run_query(connection: &mut PgConnection, query: &str) -> Result<Value, HandlerError> {
    let rows = sqlx::query(query)
        .fetch_all(connection)
        .await
        .map_err(|e| HandlerError::Io(e.to_string()))?;

    let fields: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let out_rows: Vec<Value> = rows.iter().map(row_to_json).collect();

    Ok(json!({
        "rows": out_rows,
        "rowCount": out_rows.len(),
        "fields": fields,
    }))
}

fn row_to_json(row: &PgRow) -> Value {
    let mut record = Map::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), column_to_json(row, column));
    }
    Value::Object(record)
}

/// Decode one column into JSON by Postgres type name, falling back to the
/// text representation (and finally null) for exotic types.
fn column_to_json(row: &PgRow, column: &sqlx::postgres::PgColumn) -> Value {
    let idx = column.ordinal();

    fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(idx).ok().flatten()
    }

    match column.type_info().name() {
        "BOOL" => get::<bool>(row, idx).map(Value::Bool),
        "INT2" => get::<i16>(row, idx).map(|v| json!(v)),
        "INT4" => get::<i32>(row, idx).map(|v| json!(v)),
        "INT8" => get::<i64>(row, idx).map(|v| json!(v)),
        "FLOAT4" => get::<f32>(row, idx).map(|v| json!(v)),
        "FLOAT8" => get::<f64>(row, idx).map(|v| json!(v)),
        "JSON" | "JSONB" => get::<Value>(row, idx),
        "TIMESTAMPTZ" => {
            get::<chrono::DateTime<chrono::Utc>>(row, idx).map(|v| json!(v.to_rfc3339()))
        }
        "TIMESTAMP" => get::<chrono::NaiveDateTime>(row, idx).map(|v| json!(v.to_string())),
        "DATE" => get::<chrono::NaiveDate>(row, idx).map(|v| json!(v.to_string())),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
            get::<String>(row, idx).map(Value::String)
        }
        other => {
            // Last resort: many types decode as text.
            let value = get::<String>(row, idx).map(Value::String);
            if value.is_none() {
                warn!(column = column.name(), pg_type = other, "column decoded as null");
            }
            value
        }
    }
    .unwrap_or(Value::Null)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use engine::NodeKind;

    fn db_node(data: Value) -> Node {
        Node {
            id: "db".into(),
            kind: NodeKind::Database,
            position: Value::Null,
            data: data.as_object().cloned().unwrap(),
        }
    }

    #[tokio::test]
    async fn malformed_connection_string_is_an_io_error() {
        let node = db_node(json!({
            "connectionString": "not-a-postgres-url",
            "query": "SELECT 1",
        }));
        let err = DatabaseNode.handle(&node, &Context::new()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Io(_)));
    }

    #[tokio::test]
    async fn templated_query_resolves_before_execution() {
        // Resolution happens before the connection attempt, so a bogus
        // connection string still exercises it: the error message never
        // sees the unresolved placeholder.
        let node = db_node(json!({
            "connectionString": "{{cfg.dsn}}",
            "query": "SELECT * FROM users WHERE id = {{hook.userId}}",
        }));
        let mut context = Context::new();
        context.insert("cfg".into(), json!({ "dsn": "also-not-a-url" }));
        context.insert("hook".into(), json!({ "userId": 7 }));

        let err = DatabaseNode.handle(&node, &context).await.unwrap_err();
        match err {
            HandlerError::Io(message) => assert!(!message.contains("{{")),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    /// Requires a live Postgres; run with
    /// `FLOWGRID_TEST_DATABASE_URL=postgres://… cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn live_query_returns_rows_and_fields() {
        let dsn = std::env::var("FLOWGRID_TEST_DATABASE_URL").expect("test database url");
        let node = db_node(json!({
            "connectionString": dsn,
            "query": "SELECT 1 AS one, 'two' AS two, true AS three",
        }));

        let output = DatabaseNode.handle(&node, &Context::new()).await.unwrap();
        assert_eq!(output["rowCount"], 1);
        assert_eq!(output["fields"], json!(["one", "two", "three"]));
        assert_eq!(output["rows"][0], json!({ "one": 1, "two": "two", "three": true }));
    }
}
