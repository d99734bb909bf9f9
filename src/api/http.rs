use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::pagination::Filters;
use super::service::{NewsList, NewsService, ReadError};
use crate::storage::NewsItem;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw query string. Values are kept as text so that garbage can be
/// ignored instead of rejected.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<String>,
    pagesize: Option<String>,
}

impl ListQuery {
    fn filters(&self) -> Filters {
        let parse = |v: &Option<String>| {
            v.as_deref()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0)
        };
        Filters::new(parse(&self.page), parse(&self.pagesize)).normalize()
    }
}

enum ApiError {
    BadRequest(String),
    Read(ReadError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Read(e @ ReadError::NotFound(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Read(ReadError::Store(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ReadError> for ApiError {
    fn from(err: ReadError) -> Self {
        ApiError::Read(err)
    }
}

/// JSON routes over the read API.
pub fn router(service: NewsService) -> Router {
    Router::new()
        .route("/api/news", get(list_news))
        .route("/api/news/:id", get(get_news))
        .with_state(service)
        .layer(request_timeout())
        .layer(TraceLayer::new_for_http())
}

fn request_timeout() -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT)
}

async fn list_news(
    State(service): State<NewsService>,
    Query(query): Query<ListQuery>,
) -> Result<Json<NewsList>, ApiError> {
    Ok(Json(service.list_news(query.filters()).await?))
}

async fn get_news(
    State(service): State<NewsService>,
    Path(id): Path<String>,
) -> Result<Json<NewsItem>, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid news id: {id}")))?;
    Ok(Json(service.get_single_news(id).await?))
}

/// Serve `router(service)` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    service: NewsService,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "HTTP server listening");
    }
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("HTTP server stopped");
    Ok(())
}
