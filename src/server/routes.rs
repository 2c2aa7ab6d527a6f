//! HTTPエンドポイント
//!
//! - `POST /predict`  : multipartの `file` を分類してJSONで返す
//! - `GET  /`         : アップロードフォーム
//! - `POST /classify` : フォームからの画像を分類してHTMLで返す
//! - `GET  /health`   : 死活監視

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::error::{Error, Result};
use crate::ml::preprocess::check_upload_type;
use crate::model::OutputMode;
use crate::server::state::ServerState;
use crate::types::{Classification, PredictionResponse};

/// 有効な出力形式に応じてルーターを作成
pub fn create_router(state: ServerState) -> Router {
    let mut router = Router::new().route("/health", get(health_check));

    if state.settings.is_enabled(OutputMode::Json) {
        router = router.route("/predict", post(predict));
    }
    if state.settings.is_enabled(OutputMode::Page) {
        router = router
            .route("/", get(index_page))
            .route("/classify", post(classify_page));
    }

    router
        .layer(DefaultBodyLimit::max(state.settings.body_limit_bytes))
        .with_state(state)
}

/// multipartから取り出したアップロードファイル
struct Upload {
    file_name: Option<String>,
    bytes: Bytes,
}

/// `file` フィールドを探して読み込む
///
/// multipartでないリクエスト・フィールド無し・空ファイルはいずれも MissingInput、
/// 上限サイズ超過は PayloadTooLarge
async fn read_upload(
    multipart: std::result::Result<Multipart, MultipartRejection>,
    limit: usize,
) -> Result<Upload> {
    let upload_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Error::PayloadTooLarge(limit)
        } else {
            Error::Upload(e.body_text())
        }
    };

    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("multipartとして読めないリクエスト: {}", rejection);
        Error::MissingInput
    })?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(upload_error)?;
        if bytes.is_empty() {
            return Err(Error::MissingInput);
        }

        tracing::debug!(file_name = ?file_name, size = bytes.len(), "アップロード受信");
        return Ok(Upload { file_name, bytes });
    }

    Err(Error::MissingInput)
}

/// 推論はCPUを占有するのでブロッキング用スレッドで実行
async fn run_pipeline(state: &ServerState, bytes: Bytes) -> Result<Classification> {
    let pipeline = state.pipeline.clone();
    tokio::task::spawn_blocking(move || pipeline.run(&bytes))
        .await
        .map_err(|e| Error::Inference(format!("inference task failed: {}", e)))?
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// 画像を分類してJSONで返す
async fn predict(
    State(state): State<ServerState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>> {
    let upload = read_upload(multipart, state.settings.body_limit_bytes).await?;
    let classification = run_pipeline(&state, upload.bytes).await?;
    Ok(Json(PredictionResponse::from(&classification)))
}

async fn index_page(State(state): State<ServerState>) -> Response {
    match state.pages.render_index() {
        Ok(html) => Html(html).into_response(),
        Err(e) => e.into_response(),
    }
}

/// フォームからの画像を分類してHTMLで返す
async fn classify_page(
    State(state): State<ServerState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let outcome = async {
        let upload = read_upload(multipart, state.settings.body_limit_bytes).await?;
        check_upload_type(upload.file_name.as_deref(), &upload.bytes)?;
        let classification = run_pipeline(&state, upload.bytes.clone()).await?;
        state
            .pages
            .render_result(upload.file_name.as_deref(), &upload.bytes, &classification)
    }
    .await;

    match outcome {
        Ok(html) => Html(html).into_response(),
        Err(error) => {
            if error.is_client_error() {
                tracing::warn!("リクエストエラー: {}", error);
            } else {
                tracing::error!("サーバエラー: {}", error);
            }
            match state.pages.render_error(&error) {
                Ok(html) => (error.status_code(), Html(html)).into_response(),
                Err(render_error) => render_error.into_response(),
            }
        }
    }
}
