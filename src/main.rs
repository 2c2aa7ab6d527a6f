//! 分類サーバ本体
//!
//! 設定ファイル → コマンドライン引数・環境変数の順に上書きし、モデルを読み込んでから
//! HTTPサーバを起動します。モデルが読み込めない場合はリクエストを受け付ける前に終了します。

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use waste_sorter_lib::catalog::CategoryCatalog;
use waste_sorter_lib::ml::load_for_device;
use waste_sorter_lib::model::{load_class_indices, AppConfig, DeviceType, InferenceConfig};
use waste_sorter_lib::pipeline::ClassificationPipeline;
use waste_sorter_lib::server::{self, ServerState};

#[derive(Parser)]
#[command(author, version, about = "Waste image classification server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "WASTE_SORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the model artifact (.tar.gz)
    #[arg(short, long, value_name = "FILE", env = "WASTE_SORTER_MODEL")]
    model: Option<PathBuf>,

    /// Path to class_indices.json (class name -> index)
    #[arg(long, value_name = "FILE", env = "WASTE_SORTER_CLASS_INDICES")]
    class_indices: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "WASTE_SORTER_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "WASTE_SORTER_PORT")]
    port: Option<u16>,

    /// Compute device
    #[arg(long, value_enum, env = "WASTE_SORTER_DEVICE")]
    device: Option<DeviceType>,
}

impl Cli {
    /// 引数で指定された値で設定を上書き
    fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model.model_path = model.display().to_string();
        }
        if let Some(class_indices) = &self.class_indices {
            config.model.class_indices_path = Some(class_indices.display().to_string());
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(device) = self.device {
            config.device_type = device;
        }
    }
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<ClassificationPipeline> {
    let model_path = PathBuf::from(&config.model.model_path);
    let loaded = load_for_device(config.device_type, &model_path)?;

    let labels = match &config.model.class_indices_path {
        Some(path) => {
            let class_indices = load_class_indices(Path::new(path))?;
            let labels = InferenceConfig::from_metadata(&loaded.metadata)
                .with_class_indices(&class_indices)
                .with_context(|| format!("Invalid class indices: {}", path))?;
            Some(labels)
        }
        None => None,
    };

    let catalog = match &config.model.catalog_path {
        Some(path) => CategoryCatalog::from_json_file(Path::new(path))?,
        None => CategoryCatalog::builtin(),
    };

    let pipeline = ClassificationPipeline::from_loaded(loaded, labels, catalog)?;
    pipeline.resolver().labels().log_info();
    Ok(pipeline)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default(&config_path)?;
    cli.apply(&mut config);
    config.validate()?;
    config.log_summary();

    let pipeline = build_pipeline(&config).context("Failed to initialize classifier")?;
    let state = ServerState::new(pipeline, config.server.clone())?;

    server::serve(state).await
}
