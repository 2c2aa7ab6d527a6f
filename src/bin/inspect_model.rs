//! モデル成果物の確認用バイナリ
//!
//! メタデータを表示し、画像が指定された場合はその場で分類結果を出力します。

use std::path::PathBuf;

use clap::Parser;

use waste_sorter_lib::catalog::CategoryCatalog;
use waste_sorter_lib::ml::load_for_device;
use waste_sorter_lib::model::{load_metadata, print_metadata_info, DeviceType};
use waste_sorter_lib::pipeline::ClassificationPipeline;
use waste_sorter_lib::types::PredictionResponse;

#[derive(Parser)]
#[command(about = "Inspect a waste classifier artifact", long_about = None)]
struct Args {
    /// Path to the model artifact (.tar.gz)
    model: PathBuf,

    /// Images to classify with the model
    images: Vec<PathBuf>,

    /// Compute device
    #[arg(long, value_enum, default_value = "cpu")]
    device: DeviceType,
}

fn main() {
    let args = Args::parse();

    println!("=== Waste Classifier Inspector ===\n");

    println!("Test 1: モデルメタデータ読み込み");
    match load_metadata(&args.model) {
        Ok(metadata) => {
            println!("✓ モデルメタデータ読み込み成功:");
            print_metadata_info(&metadata);
        }
        Err(e) => {
            eprintln!("✗ エラー: {:#}", e);
            std::process::exit(1);
        }
    }

    if args.images.is_empty() {
        return;
    }

    println!("\n{}\n", "=".repeat(50));
    println!("Test 2: 画像分類");

    let pipeline = match load_for_device(args.device, &args.model)
        .and_then(|loaded| ClassificationPipeline::from_loaded(loaded, None, CategoryCatalog::builtin()))
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("✗ モデル読み込みエラー: {}", e);
            std::process::exit(1);
        }
    };

    for image in &args.images {
        let result = std::fs::read(image)
            .map_err(|e| e.to_string())
            .and_then(|bytes| pipeline.run(&bytes).map_err(|e| e.to_string()));

        match result {
            Ok(classification) => {
                let response = PredictionResponse::from(&classification);
                println!("✓ {}", image.display());
                println!("  カテゴリ: {} ({:.1}%)", response.category, response.confidence * 100.0);
                println!("  判定: {}", response.prediction);
                println!("  ヒント: {}", response.suggestion);
            }
            Err(e) => {
                eprintln!("✗ {}: {}", image.display(), e);
            }
        }
    }
}
