//! モデルメタデータの定義
//!
//! tar.gz形式のモデル成果物に同梱される `metadata.json` の内容です。
//! 推論時の前処理（入力サイズ・チャンネル順）とクラスラベルはここから決まります。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::ChannelOrder;

/// デフォルトのモデル入力サイズ（正方形）
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラスラベル（インデックス順）
    /// 例: ["cardboard", "glass", "metal", "paper", "plastic", "trash"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（通常224x224）
    #[serde(default = "default_input_size")]
    pub model_input_size: u32,

    /// 学習時の色チャンネル順
    #[serde(default)]
    pub channel_order: ChannelOrder,

    /// 成果物の作成時刻（ISO8601形式）
    pub created_at: String,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(class_labels: Vec<String>, model_input_size: u32, channel_order: ChannelOrder) -> Self {
        let created_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels,
            model_input_size,
            channel_order,
            created_at,
        }
    }

    /// クラス数
    pub fn num_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// 内容の整合性チェック
    pub fn validate(&self) -> Result<()> {
        if self.class_labels.is_empty() {
            anyhow::bail!("class_labels is empty");
        }
        // 3x3 conv + pool を2回通すため最低限のサイズが必要
        if self.model_input_size < 16 {
            anyhow::bail!("model_input_size too small: {}", self.model_input_size);
        }
        Ok(())
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}
