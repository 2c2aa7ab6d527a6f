//! サーバ状態
//!
//! 起動時に1度だけ構築し、以降は読み取り専用で全リクエストから共有します。

use std::sync::Arc;

use crate::error::Result;
use crate::model::ServerSettings;
use crate::pipeline::ClassificationPipeline;
use crate::server::page::PageRenderer;

#[derive(Clone)]
pub struct ServerState {
    /// 分類パイプライン（モデル・ラベル・カテゴリ表）
    pub pipeline: Arc<ClassificationPipeline>,

    /// フォーム画面のテンプレート
    pub pages: Arc<PageRenderer>,

    /// サーバ設定
    pub settings: Arc<ServerSettings>,
}

impl ServerState {
    pub fn new(pipeline: ClassificationPipeline, settings: ServerSettings) -> Result<Self> {
        Ok(Self {
            pipeline: Arc::new(pipeline),
            pages: Arc::new(PageRenderer::new()?),
            settings: Arc::new(settings),
        })
    }
}
