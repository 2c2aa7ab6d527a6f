//! モデル成果物（tar.gz）の作成用バイナリ
//!
//! 学習済みの重み（named-msgpack）と class_indices.json をまとめて
//! サーバが読み込める成果物にします。`--init` を指定すると重みファイルの代わりに
//! ランダム初期化したモデルを書き出します（動作確認用）。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use waste_sorter_lib::ml::{CpuBackend, ModelConfig};
use waste_sorter_lib::model::{
    invert_class_indices, load_class_indices, print_metadata_info, save_model_with_metadata, ModelMetadata,
    DEFAULT_INPUT_SIZE,
};
use waste_sorter_lib::types::ChannelOrder;

#[derive(Parser)]
#[command(about = "Bundle weights and class indices into a model artifact", long_about = None)]
struct Args {
    /// class_indices.json (class name -> index)
    #[arg(long, value_name = "FILE")]
    class_indices: PathBuf,

    /// Trained weights (named msgpack)
    #[arg(long, value_name = "FILE", required_unless_present = "init", conflicts_with = "init")]
    weights: Option<PathBuf>,

    /// Write randomly initialized weights instead of a trained model
    #[arg(long)]
    init: bool,

    /// Model input size (square)
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    input_size: u32,

    /// Channel order the model was trained with
    #[arg(long, value_enum, default_value = "rgb")]
    channel_order: ChannelOrder,

    /// Output path (.tar.gz is appended if missing)
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let class_indices = load_class_indices(&args.class_indices)?;
    let labels = invert_class_indices(&class_indices)?
        .into_iter()
        .enumerate()
        .map(|(index, label)| label.with_context(|| format!("class index {} has no label", index)))
        .collect::<Result<Vec<_>>>()?;

    let metadata = ModelMetadata::new(labels, args.input_size, args.channel_order);
    metadata.validate()?;

    let weights = match &args.weights {
        Some(path) => std::fs::read(path).with_context(|| format!("Failed to read weights: {:?}", path))?,
        None => {
            let device = Default::default();
            ModelConfig::new(metadata.num_classes())
                .init::<CpuBackend>(&device)
                .to_bytes()?
        }
    };

    let saved = save_model_with_metadata(&args.output, &metadata, &weights)?;
    println!("✓ モデルを保存しました: {}", saved.display());
    print_metadata_info(&metadata);
    Ok(())
}
