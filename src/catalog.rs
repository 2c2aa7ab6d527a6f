//! カテゴリ表（クラス名 → リサイクル可否・ヒント）
//!
//! 予測されたクラスインデックスを `ClassEntry` に変換します。
//! 表に無いインデックスやクラス名でもエラーにはせず、「unknown」エントリを返します。

use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

use crate::model::InferenceConfig;
use crate::types::{ClassEntry, Recyclability};

/// 未知のクラスを表す名前
pub const UNKNOWN_CATEGORY: &str = "unknown";

// (名前, 可否, 処理方法, 詳しいコツ, 再利用アイデア)
const BUILTIN_ENTRIES: [(&str, Recyclability, &str, &str, &str); 6] = [
    (
        "cardboard",
        Recyclability::Recyclable,
        "Flatten boxes and keep them dry before recycling.",
        "Remove tape and staples where you can. Wet or food-soiled cardboard (like pizza boxes) belongs in compost or trash.",
        "Turn sturdy boxes into storage bins, drawer dividers, or garden mulch.",
    ),
    (
        "glass",
        Recyclability::Recyclable,
        "Rinse bottles, remove caps, and avoid broken glass.",
        "Sort by color if your area requires it. Window glass, mirrors, and ceramics are not accepted with bottles and jars.",
        "Reuse jars for pantry storage, candle holders, or seedling pots.",
    ),
    (
        "metal",
        Recyclability::Recyclable,
        "Clean cans, remove labels if possible, and recycle.",
        "Aluminium and steel cans are both accepted. Empty aerosol cans completely and keep sharp lids inside the can.",
        "Use cans as pencil holders, planters, or lanterns.",
    ),
    (
        "paper",
        Recyclability::Recyclable,
        "Keep it clean and dry. Don't recycle greasy paper.",
        "Shredded paper should be bagged. Receipts and laminated paper are usually not recyclable.",
        "Reuse one-sided sheets as notepads or wrap gifts with old newspaper.",
    ),
    (
        "plastic",
        Recyclability::Recyclable,
        "Rinse and reuse this plastic bottle.",
        "Check the resin code: 1 (PET) and 2 (HDPE) are widely accepted. Plastic bags and films go to store drop-off points.",
        "Cut bottles into planters, bird feeders, or scoops.",
    ),
    (
        "trash",
        Recyclability::NonRecyclable,
        "Not recyclable. Try to reduce or reuse if possible.",
        "Dispose of it with general waste. Batteries and electronics need a dedicated collection point.",
        "Before throwing it away, consider whether it can be repaired or donated.",
    ),
];

const UNKNOWN_TIP: &str = "Handle carefully.";
const UNKNOWN_GUIDANCE: &str = "This item could not be identified. Check your local waste guidelines before disposal.";

/// カテゴリ表
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    entries: HashMap<String, ClassEntry>,
    unknown: ClassEntry,
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CategoryCatalog {
    /// 組み込みの表
    pub fn builtin() -> Self {
        let entries = BUILTIN_ENTRIES
            .iter()
            .map(|(name, recyclability, tip, guidance, reuse_tip)| ClassEntry {
                name: name.to_string(),
                recyclability: *recyclability,
                tip: tip.to_string(),
                guidance: guidance.to_string(),
                reuse_tip: Some(reuse_tip.to_string()),
            });
        Self::from_entries(entries)
    }

    /// エントリ一覧から作成（同名は後勝ち）
    pub fn from_entries<I: IntoIterator<Item = ClassEntry>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
            unknown: ClassEntry {
                name: UNKNOWN_CATEGORY.to_string(),
                recyclability: Recyclability::Unknown,
                tip: UNKNOWN_TIP.to_string(),
                guidance: UNKNOWN_GUIDANCE.to_string(),
                reuse_tip: None,
            },
        }
    }

    /// JSONファイル（ClassEntryの配列）から読み込む
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {:?}", path))?;
        let entries: Vec<ClassEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {:?}", path))?;
        if entries.is_empty() {
            anyhow::bail!("catalog file {:?} has no entries", path);
        }
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 「unknown」エントリ
    pub fn unknown(&self) -> &ClassEntry {
        &self.unknown
    }

    /// クラス名で検索
    pub fn get(&self, name: &str) -> Option<&ClassEntry> {
        self.entries.get(name)
    }

    /// クラス名をエントリに変換
    ///
    /// 表に無いクラス名は、その名前のまま可否 Unknown・unknownのヒントで返す
    pub fn entry_for(&self, name: &str) -> ClassEntry {
        match self.entries.get(name) {
            Some(entry) => entry.clone(),
            None => ClassEntry {
                name: name.to_string(),
                ..self.unknown.clone()
            },
        }
    }

    /// ラベル表に載っていないクラス名
    pub fn missing_labels<'a>(&self, labels: &'a InferenceConfig) -> Vec<&'a str> {
        labels
            .class_labels
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|name| !self.entries.contains_key(*name))
            .collect()
    }
}

/// クラスインデックス → ClassEntry の変換
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    labels: InferenceConfig,
    catalog: CategoryCatalog,
}

impl CategoryResolver {
    pub fn new(labels: InferenceConfig, catalog: CategoryCatalog) -> Self {
        for name in catalog.missing_labels(&labels) {
            tracing::warn!("カテゴリ表に '{}' がありません。リサイクル可否は unknown になります", name);
        }
        Self { labels, catalog }
    }

    pub fn labels(&self) -> &InferenceConfig {
        &self.labels
    }

    /// クラスインデックスをエントリに変換（失敗しない）
    pub fn resolve(&self, class_index: usize) -> ClassEntry {
        match self.labels.class_index_to_label(class_index) {
            Some(name) => self.catalog.entry_for(name),
            None => {
                tracing::debug!(class_index, "ラベルの無いクラスインデックス");
                self.catalog.unknown().clone()
            }
        }
    }
}
