//! HTTP facade: `GET /translate?text=...` answering in plain text.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{HonyakuError, Result};
use crate::translate::{TranslateOptions, TranslationService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TranslationService>,
}

impl AppState {
    pub fn new(service: TranslationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TranslateParams {
    pub text: Option<String>,
    pub separator: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/translate", get(translate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Translation proxy listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn translate(State(state): State<AppState>, Query(params): Query<TranslateParams>) -> Response {
    let Some(text) = params.text else {
        return (StatusCode::BAD_REQUEST, "[ERROR]缺少 text 参数").into_response();
    };

    let span = info_span!("translate", request_id = %Uuid::new_v4());
    let limit = state.service.runtime().load().config.server.timeout();
    let options = TranslateOptions {
        separator: params.separator,
    };

    match translate_with_timeout(Arc::clone(&state.service), text, options, limit)
        .instrument(span)
        .await
    {
        Ok(translated) => (StatusCode::OK, translated).into_response(),
        Err(e) => {
            error!("Translation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("[ERROR]{}", e)).into_response()
        }
    }
}

/// Run one translation on its own task. On timeout the task is left to
/// finish in the background and its result is dropped.
pub async fn translate_with_timeout(
    service: Arc<TranslationService>,
    text: String,
    options: TranslateOptions,
    limit: Duration,
) -> Result<String> {
    let task = tokio::spawn(async move { service.translate(&text, &options).await }.in_current_span());

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(HonyakuError::Translation(format!("translation task failed: {}", e))),
        Err(_) => {
            warn!("Translation exceeded {:?}", limit);
            Err(HonyakuError::Timeout)
        }
    }
}
