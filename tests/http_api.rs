use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{StreamExt, stream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use honyaku::backend::{BackendError, BackendRegistry, ChatBackend, FragmentStream, GenerationRequest};
use honyaku::config::Config;
use honyaku::reload::{Runtime, Snapshot};
use honyaku::server::{AppState, router};
use honyaku::translate::dictionary::Dictionary;
use honyaku::translate::{SENTINEL, TranslationService};

type Reply = Result<Vec<&'static str>, BackendError>;

/// Plays back canned replies in order and records what it was asked.
struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    seen: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_generate(&self, request: &GenerationRequest) -> Result<FragmentStream, BackendError> {
        self.seen.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(BackendError::EmptyResponse));
        reply.map(|parts| stream::iter(parts.into_iter().map(|p| Ok(p.to_string()))).boxed())
    }
}

fn app(backend: Arc<ScriptedBackend>) -> axum::Router {
    let mut config = Config::default();
    config.api_priority = vec!["scripted".to_string()];
    config.retry.backoff_secs = 0;
    let mut backends = BackendRegistry::new();
    backends.insert("scripted", "scripted-model", backend);

    let service = TranslationService::new(
        Snapshot::new(Runtime { config, backends }),
        Snapshot::new(Dictionary::default()),
    );
    router(AppState::new(service))
}

fn translate_uri(params: &[(&str, &str)]) -> String {
    let url = reqwest::Url::parse_with_params("http://localhost/translate", params).unwrap();
    format!("{}?{}", url.path(), url.query().unwrap_or(""))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn missing_text_is_a_bad_request() {
    let backend = ScriptedBackend::new(vec![]);
    let (status, body) = get(app(backend.clone()), "/translate").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "[ERROR]缺少 text 参数");
    assert!(backend.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn translation_keeps_source_brackets() {
    let backend = ScriptedBackend::new(vec![Ok(vec!["你好", "。"])]);
    let uri = translate_uri(&[("text", "「こんにちは！」")]);
    let (status, body) = get(app(backend.clone()), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "「你好！」");
    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].user_text, "こんにちは");
    assert_eq!(seen[0].model, "scripted-model");
}

#[tokio::test]
async fn blocked_output_returns_sentinel_with_ok_status() {
    let backend = ScriptedBackend::new(vec![Ok(vec!["这个问题我暂时无法回答"])]);
    let uri = translate_uri(&[("text", "危ない話。")]);
    let (status, body) = get(app(backend), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SENTINEL);
}

#[tokio::test]
async fn blocked_output_keeps_source_brackets() {
    let backend = ScriptedBackend::new(vec![Ok(vec!["我无法给到", "相关内容"])]);
    let uri = translate_uri(&[("text", "『危ない話？』")]);
    let (status, body) = get(app(backend), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "『数据检查错误，输入或者输出包含疑似敏感内容被云服务商拦截？』");
}

#[tokio::test]
async fn exhausted_retries_are_reported_as_error() {
    let backend = ScriptedBackend::new(vec![
        Err(BackendError::Api { status: 502, body: "bad gateway".to_string() }),
        Err(BackendError::Api { status: 502, body: "bad gateway".to_string() }),
        Err(BackendError::Api { status: 502, body: "bad gateway".to_string() }),
    ]);
    let uri = translate_uri(&[("text", "テスト")]);
    let (status, body) = get(app(backend.clone()), &uri).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("[ERROR]"));
    assert!(body.contains("bad gateway"));
    assert_eq!(backend.seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn separator_is_forwarded_as_one_unit() {
    let backend = ScriptedBackend::new(vec![Ok(vec!["「甲」", "||", "「乙」"])]);
    let uri = translate_uri(&[("text", "「あ」||「い」"), ("separator", "||")]);
    let (status, body) = get(app(backend.clone()), &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "「甲」||「乙」");
    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen[0].user_text, "「あ」||「い」");
    assert!(seen[0].system_prompt.contains("“||”"));
}
