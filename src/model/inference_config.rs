//! モデルメタデータを使用した推論設定
//!
//! 前処理パラメータとクラスインデックス→ラベルの対応表を保持します。
//! ラベルはメタデータから取得するか、学習時に出力された class_indices.json
//! （クラス名→インデックス）を反転して上書きします。

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::model_metadata::ModelMetadata;
use crate::types::ChannelOrder;

/// モデルメタデータから推論用情報を取得
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    /// インデックス順のクラスラベル（欠番は None）
    pub class_labels: Vec<Option<String>>,

    /// モデル入力解像度
    pub model_input_size: u32,

    /// 学習時の色チャンネル順
    pub channel_order: ChannelOrder,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.iter().cloned().map(Some).collect(),
            model_input_size: metadata.model_input_size,
            channel_order: metadata.channel_order,
        }
    }

    /// class_indices.json の内容でラベルを置き換える
    pub fn with_class_indices(mut self, class_indices: &BTreeMap<String, usize>) -> Result<Self> {
        self.class_labels = invert_class_indices(class_indices)?;
        Ok(self)
    }

    /// 全クラス数（欠番を含むテーブル長）
    pub fn num_total_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// クラスインデックスからラベルを取得
    ///
    /// 範囲外・欠番の場合は None
    pub fn class_index_to_label(&self, index: usize) -> Option<&str> {
        self.class_labels.get(index)?.as_deref()
    }

    /// ラベルからクラスインデックスを取得
    pub fn label_to_class_index(&self, label: &str) -> Option<usize> {
        self.class_labels
            .iter()
            .position(|l| l.as_deref() == Some(label))
    }

    /// 設定情報をログに出力
    pub fn log_info(&self) {
        let labels: Vec<&str> = self
            .class_labels
            .iter()
            .map(|l| l.as_deref().unwrap_or("-"))
            .collect();
        tracing::info!(
            classes = self.num_total_classes(),
            input_size = self.model_input_size,
            channel_order = %self.channel_order,
            "推論設定: ラベル [{}]",
            labels.join(", ")
        );
    }
}

const MAX_CLASS_INDEX: usize = 10_000;

/// class_indices.json（クラス名→インデックス）を読み込む
pub fn load_class_indices(path: &Path) -> Result<BTreeMap<String, usize>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read class indices file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse class indices file: {:?}", path))
}

/// クラス名→インデックスの対応を インデックス→クラス名 に反転
///
/// 同じインデックスが複数のクラスに割り当てられている場合はエラー
pub fn invert_class_indices(class_indices: &BTreeMap<String, usize>) -> Result<Vec<Option<String>>> {
    let Some(max_index) = class_indices.values().copied().max() else {
        anyhow::bail!("class indices are empty");
    };
    if max_index >= MAX_CLASS_INDEX {
        anyhow::bail!("class index {} is out of range (max {})", max_index, MAX_CLASS_INDEX - 1);
    }

    let mut labels: Vec<Option<String>> = vec![None; max_index + 1];
    for (name, &index) in class_indices {
        if let Some(existing) = &labels[index] {
            anyhow::bail!(
                "class index {} is assigned to both '{}' and '{}'",
                index,
                existing,
                name
            );
        }
        labels[index] = Some(name.clone());
    }

    Ok(labels)
}
