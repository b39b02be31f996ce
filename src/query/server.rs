use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::core::OrderedValue;
use crate::error::EnumError;
use crate::query::protocol::{EnumRanker, EvaluationRequest, ReloadOp};
use crate::query::source::MemoryFieldSource;
use crate::stats::StoreReport;

#[derive(Deserialize)]
pub struct ScoreParams {
    /// 枚举名 / 文档字段名（可带 reload 前缀）
    pub field: String,
    /// 操作码，缺省为 EVALUATE
    pub op: Option<i64>,
    /// 每篇候选文档的字段值，null 表示无值
    #[serde(default)]
    pub values: Vec<Option<String>>,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    pub description: String,
    pub generation: u64,
    pub scores: Vec<Option<i64>>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub description: String,
    pub generation: u64,
}

#[derive(Serialize)]
pub struct EnumsResponse {
    pub generation: u64,
    pub enums: BTreeMap<String, Vec<OrderedValue>>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub enum ApiError {
    Enum(EnumError),
    Internal(String),
}

impl From<EnumError> for ApiError {
    fn from(e: EnumError) -> Self {
        ApiError::Enum(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Enum(e @ EnumError::UnknownEnumeration { .. }) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Enum(e @ EnumError::InvalidOperation { .. }) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Enum(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

/// HTTP 打分服务：宿主打分管线的最小替身
pub struct QueryServer {
    pub ranker: Arc<EnumRanker>,
}

impl QueryServer {
    pub fn new(ranker: Arc<EnumRanker>) -> Self {
        Self { ranker }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/score", post(score_handler))
            .route("/reload", post(reload_handler))
            .route("/status", get(status_handler))
            .route("/enums", get(enums_handler))
            .with_state(self.ranker)
    }

    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        tracing::info!("HTTP Enum Server listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// reload 可能阻塞在文件 / 网络 I/O 上，放到 blocking 线程池
async fn blocking<T, F>(ranker: Arc<EnumRanker>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&EnumRanker) -> Result<T, EnumError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&ranker))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn score_handler(
    State(ranker): State<Arc<EnumRanker>>,
    Json(params): Json<ScoreParams>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let response = blocking(ranker, move |ranker| {
        let op = ReloadOp::from_code(params.op.unwrap_or(0))?;
        let req = EvaluationRequest::with_prefix(&params.field, op, ranker.reload_prefix());
        let evaluator = ranker.evaluator(&req)?;

        let docs: MemoryFieldSource = params.values.iter().map(|v| v.as_deref()).collect();
        let scores = docs
            .docs()
            .into_iter()
            .map(|doc| {
                if evaluator.exists(&docs, doc) {
                    Some(evaluator.doc_value(&docs, doc))
                } else {
                    None
                }
            })
            .collect();

        Ok(ScoreResponse {
            description: evaluator.description(),
            generation: evaluator.cache_key().generation(),
            scores,
        })
    })
    .await?;
    Ok(Json(response))
}

async fn reload_handler(
    State(ranker): State<Arc<EnumRanker>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let response = blocking(ranker, |ranker| {
        let evaluator = ranker.evaluator(&EvaluationRequest::new("", ReloadOp::ReloadOnly))?;
        Ok(ReloadResponse {
            description: evaluator.description(),
            generation: evaluator.cache_key().generation(),
        })
    })
    .await?;
    Ok(Json(response))
}

async fn status_handler(State(ranker): State<Arc<EnumRanker>>) -> Json<StoreReport> {
    Json(ranker.report())
}

async fn enums_handler(State(ranker): State<Arc<EnumRanker>>) -> Json<EnumsResponse> {
    let snap = ranker.store().snapshot();
    let enums = snap
        .enumerations()
        .iter()
        .map(|(name, mapping)| (name.to_string(), mapping.entries()))
        .collect();
    Json(EnumsResponse {
        generation: snap.generation(),
        enums,
    })
}
