//! エラー型の定義
//!
//! リクエスト単位のエラー（入力なし・デコード失敗など）と起動時の致命的エラー
//! （モデル読み込み失敗・設定エラー）を1つの列挙型で扱います。
//! 未知のクラスインデックスはエラーにせず、`catalog` 側で「unknown」エントリを返します。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// アップロードファイルが無い
    #[error("No file uploaded")]
    MissingInput,

    /// 画像としてデコードできない
    #[error("Invalid image file: {0}")]
    Decode(#[from] image::ImageError),

    /// フォームで受け付けない拡張子
    #[error("Unsupported file type: {0} (jpg, jpeg, png only)")]
    UnsupportedFileType(String),

    /// multipartボディの読み取りエラー
    #[error("Malformed upload: {0}")]
    Upload(String),

    /// アップロードが上限サイズを超えた
    #[error("Uploaded file is too large (limit {0} bytes)")]
    PayloadTooLarge(usize),

    /// モデル成果物の読み込みエラー（起動時に致命的）
    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    /// 推論時のエラー
    #[error("Inference failed: {0}")]
    Inference(String),

    /// 設定・テーブルファイルのエラー
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTMLテンプレートの描画エラー
    #[error("Failed to render page: {0}")]
    Render(String),
}

impl Error {
    /// クライアントに返すHTTPステータス
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingInput | Error::Decode(_) | Error::Upload(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::ModelLoad(_) | Error::Inference(_) | Error::Config(_) | Error::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// クライアント側の入力に起因するエラーか
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        Error::Render(err.to_string())
    }
}

/// JSON形式のエラーレスポンス `{"error": "..."}`
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::warn!("リクエストエラー: {}", self);
        } else {
            tracing::error!("サーバエラー: {}", self);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}
