//! HTTP routes for the query service

use crate::pipeline::db::{SqliteSeriesReader, StoreError};
use crate::pipeline::types::{Series, SeriesRow};
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;

/// Response body for a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPayload {
    pub data: Vec<SeriesRow>,
}

/// Per-process settings shared by every request; holds no connection
#[derive(Debug, Clone)]
pub struct QueryState {
    db_path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl QueryState {
    pub fn new(db_path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            db_path: Arc::new(db_path.into()),
            busy_timeout,
        }
    }
}

#[derive(Debug)]
pub enum QueryError {
    UnknownResource(String),
    MethodNotAllowed(Method),
    Storage(StoreError),
    Internal(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::UnknownResource(path) => write!(f, "Resource not found: {}", path),
            QueryError::MethodNotAllowed(method) => write!(f, "Method not allowed: {}", method),
            QueryError::Storage(e) => write!(f, "{}", e),
            QueryError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for QueryError {}

impl QueryError {
    pub fn status(&self) -> StatusCode {
        match self {
            QueryError::UnknownResource(_) => StatusCode::NOT_FOUND,
            QueryError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            QueryError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("❌ Query failed: {}", self);
        } else {
            log::debug!("{} -> {}", self, status);
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        match self {
            QueryError::MethodNotAllowed(_) => {
                (status, [(header::ALLOW, "GET")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

/// Build the router; every response carries `Connection: close`
pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/:resource", any(serve_series))
        .fallback(fallback)
        .layer(SetResponseHeaderLayer::overriding(
            header::CONNECTION,
            HeaderValue::from_static("close"),
        ))
        .with_state(state)
}

/// Serve the router on `listener` until the process exits
pub async fn serve(listener: TcpListener, state: QueryState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("🌐 Query service listening on http://{}", addr);
    }
    axum::serve(listener, router(state)).await
}

async fn serve_series(
    State(state): State<QueryState>,
    method: Method,
    Path(resource): Path<String>,
) -> Result<Json<SeriesPayload>, QueryError> {
    if method != Method::GET {
        return Err(QueryError::MethodNotAllowed(method));
    }
    let series = Series::from_resource(&resource)
        .ok_or_else(|| QueryError::UnknownResource(format!("/{}", resource)))?;

    let data = load_series(&state, series).await?;
    log::debug!("Served {} rows of {}", data.len(), series.table());
    Ok(Json(SeriesPayload { data }))
}

async fn fallback(method: Method, uri: Uri) -> QueryError {
    if method != Method::GET {
        QueryError::MethodNotAllowed(method)
    } else {
        QueryError::UnknownResource(uri.path().to_string())
    }
}

/// Open a read-only connection, read the whole series in one transaction,
/// drop the connection
async fn load_series(state: &QueryState, series: Series) -> Result<Vec<SeriesRow>, QueryError> {
    let db_path = state.db_path.clone();
    let busy_timeout = state.busy_timeout;

    tokio::task::spawn_blocking(move || {
        let mut reader = SqliteSeriesReader::open(db_path.as_path(), busy_timeout)?;
        reader.query_all(series)
    })
    .await
    .map_err(|e| QueryError::Internal(e.to_string()))?
    .map_err(QueryError::Storage)
}
