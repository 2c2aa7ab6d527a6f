//! アプリケーション設定管理モジュール
//!
//! 計算デバイス、モデル成果物のパス、HTTPサーバ設定をJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド（`wgpu` フィーチャが必要）
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 結果の出力形式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OutputMode {
    /// `POST /predict` でJSONを返す
    Json,
    /// `GET /` のフォームから `POST /classify` でHTMLを返す
    Page,
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// モデル成果物（tar.gz）のパス
    pub model_path: String,
    /// class_indices.json のパス（指定時はメタデータのラベルを上書き）
    pub class_indices_path: Option<String>,
    /// カテゴリ表（JSON）のパス（未指定時は組み込みの表）
    pub catalog_path: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: "models/waste_classifier.tar.gz".to_string(),
            class_indices_path: None,
            catalog_path: None,
        }
    }
}

/// HTTPサーバ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// アップロードの最大サイズ（バイト）
    pub body_limit_bytes: usize,
    /// 有効にする出力形式
    pub modes: Vec<OutputMode>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            body_limit_bytes: 10 * 1024 * 1024,
            modes: vec![OutputMode::Json, OutputMode::Page],
        }
    }
}

impl ServerSettings {
    /// 待ち受けアドレス
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_enabled(&self, mode: OutputMode) -> bool {
        self.modes.contains(&mode)
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// サーバ設定
    #[serde(default)]
    pub server: ServerSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない場合はデフォルト設定を返す
    ///
    /// 存在するのに壊れている設定は黙って無視せずエラーにする
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load(path).map_err(|e| {
                anyhow::anyhow!("設定ファイルの読み込みに失敗しました ({}): {}", path.display(), e)
            })?;
            tracing::info!("設定ファイルを読み込みました: {}", path.display());
            Ok(config)
        } else {
            tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します: {}", path.display());
            Ok(Self::default())
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定内容の検証
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.modes.is_empty() {
            anyhow::bail!("server.modes must enable at least one output mode");
        }
        if self.server.body_limit_bytes == 0 {
            anyhow::bail!("server.body_limit_bytes must be greater than 0");
        }
        Ok(())
    }

    /// 設定情報をログに出力
    pub fn log_summary(&self) {
        tracing::info!(
            device = %self.device_type,
            model = %self.model.model_path,
            class_indices = ?self.model.class_indices_path,
            catalog = ?self.model.catalog_path,
            address = %self.server.bind_address(),
            modes = ?self.server.modes,
            "アプリケーション設定"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.device_type, DeviceType::Cpu);
        assert_eq!(config.server.port, 5000);
        assert!(config.server.is_enabled(OutputMode::Json));
        assert!(config.server.is_enabled(OutputMode::Page));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_deserialize() {
        let mut config = AppConfig::default();
        config.model.class_indices_path = Some("class_indices.json".to_string());
        config.server.modes = vec![OutputMode::Json];

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.model.class_indices_path.as_deref(), Some("class_indices.json"));
        assert_eq!(deserialized.server.modes, vec![OutputMode::Json]);
        assert!(!deserialized.server.is_enabled(OutputMode::Page));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"device_type": "Wgpu"}"#).unwrap();
        assert_eq!(config.device_type, DeviceType::Wgpu);
        assert_eq!(config.model.model_path, "models/waste_classifier.tar.gz");
        assert_eq!(config.server.bind_address(), "127.0.0.1:5000");
    }

    #[test]
    fn test_partial_section_uses_field_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"server": {"port": 8080}}"#).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.server.body_limit_bytes, 10 * 1024 * 1024);
        assert_eq!(config.server.modes, vec![OutputMode::Json, OutputMode::Page]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model": {"class_indices_path": "class_indices.json"}}"#).unwrap();
        let config = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(config.model.model_path, "models/waste_classifier.tar.gz");
        assert_eq!(config.model.class_indices_path.as_deref(), Some("class_indices.json"));
        assert!(config.model.catalog_path.is_none());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(config.server.port, 5000);

        let mut custom = AppConfig::default();
        custom.server.port = 8080;
        custom.save(&path).unwrap();
        assert_eq!(AppConfig::load_or_default(&path).unwrap().server.port, 8080);

        std::fs::write(&path, "{ broken").unwrap();
        assert!(AppConfig::load_or_default(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_no_modes() {
        let mut config = AppConfig::default();
        config.server.modes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(format!("{}", DeviceType::Wgpu), "WGPU (GPU)");
        assert_eq!(format!("{}", DeviceType::Cpu), "CPU (NdArray)");
    }
}
