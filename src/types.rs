use serde::{Deserialize, Serialize};

// リサイクル可否（3値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recyclability {
    Recyclable,     // リサイクル可
    NonRecyclable,  // リサイクル不可
    Unknown,        // 判定不能
}

impl Recyclability {
    /// JSONレスポンスの `prediction` に入れる2値の判定
    ///
    /// Unknown も "trash" 扱い（リサイクル可と確定したものだけ "recyclable"）
    pub fn verdict(&self) -> &'static str {
        match self {
            Recyclability::Recyclable => "recyclable",
            Recyclability::NonRecyclable | Recyclability::Unknown => "trash",
        }
    }
}

impl std::fmt::Display for Recyclability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recyclability::Recyclable => write!(f, "Recyclable"),
            Recyclability::NonRecyclable => write!(f, "Not recyclable"),
            Recyclability::Unknown => write!(f, "Unknown - check local rules"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    pub recyclability: Recyclability,
    pub tip: String,       // 短い処理方法（JSONの suggestion）
    pub guidance: String,  // 詳しいリサイクルのコツ（JSONの tip）
    #[serde(default)]
    pub reuse_tip: Option<String>, // 再利用アイデア（フォーム画面のみ表示）
}

// モデルが学習した色チャンネル順
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl std::fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelOrder::Rgb => write!(f, "RGB"),
            ChannelOrder::Bgr => write!(f, "BGR"),
        }
    }
}

/// 前処理済みの入力テンソル [1, 3, H, W]（CHW順で平坦化）
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Vec<f32>,
    pub shape: [usize; 4],
}

/// 1リクエスト分の推論結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    pub class_index: usize,
    pub scores: Vec<f32>, // クラスごとの確率（softmax後）
}

impl InferenceResult {
    /// 予測クラスの確率
    pub fn confidence(&self) -> f32 {
        self.scores.get(self.class_index).copied().unwrap_or(0.0)
    }
}

/// パイプラインの出力
#[derive(Debug, Clone)]
pub struct Classification {
    pub result: InferenceResult,
    pub entry: ClassEntry,
}

/// `POST /predict` のレスポンス
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub suggestion: String,
    pub category: String,
    pub tip: String,
    pub recyclability: Recyclability,
    pub confidence: f32,
}

impl From<&Classification> for PredictionResponse {
    fn from(c: &Classification) -> Self {
        Self {
            prediction: c.entry.recyclability.verdict().to_string(),
            suggestion: c.entry.tip.clone(),
            category: c.entry.name.clone(),
            tip: c.entry.guidance.clone(),
            recyclability: c.entry.recyclability,
            confidence: c.result.confidence(),
        }
    }
}
