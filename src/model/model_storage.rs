//! モデル成果物の永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラスラベル、入力サイズなど）
//! - model.bin       - モデルの重み（burn named-msgpack）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先パスを `.tar.gz` に正規化
fn tar_gz_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 実際に書き込んだパスを返す（拡張子が無ければ `.tar.gz` を付与）
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let path = tar_gz_path(output_path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let file = File::create(&path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", path))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    append_entry(&mut builder, METADATA_ENTRY, metadata.to_json_string()?.as_bytes())?;
    append_entry(&mut builder, MODEL_ENTRY, model_binary)?;

    builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?
        .finish()
        .context("Failed to flush gzip stream")?;

    Ok(path)
}

/// アーカイブを走査して必要なエントリだけ読み込む
///
/// `want_model` が false の場合は重みを読み飛ばす
fn read_archive(tar_gz_path: &Path, want_model: bool) -> Result<(Option<ModelMetadata>, Option<Vec<u8>>)> {
    let file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let mut metadata = None;
    let mut model_binary = None;

    for entry in archive.entries().context("Failed to read tar.gz archive")? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata = Some(ModelMetadata::from_json_string(&json_str)?);
                if !want_model {
                    break;
                }
            }
            Some(MODEL_ENTRY) if want_model => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary = Some(buffer);
            }
            _ => {}
        }
    }

    Ok((metadata, model_binary))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    read_archive(tar_gz_path, false)?
        .0
        .ok_or_else(|| anyhow::anyhow!("metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    match read_archive(tar_gz_path, true)? {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(anyhow::anyhow!("metadata.json not found in tar.gz archive")),
        (_, None) => Err(anyhow::anyhow!("model.bin not found in tar.gz archive")),
    }
}

/// メタデータをコンソールに表示
pub fn print_metadata_info(metadata: &ModelMetadata) {
    println!("\n=== モデルメタデータ ===");
    println!("クラス数: {}", metadata.num_classes());
    for (i, label) in metadata.class_labels.iter().enumerate() {
        println!("  {:>2}: {}", i, label);
    }
    println!("モデル入力サイズ: {}x{}", metadata.model_input_size, metadata.model_input_size);
    println!("チャンネル順: {}", metadata.channel_order);
    println!("作成日時: {}", metadata.created_at);
    println!("========================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelOrder;

    fn sample_metadata() -> ModelMetadata {
        ModelMetadata::new(vec!["glass".into(), "paper".into()], 224, ChannelOrder::Rgb)
    }

    #[test]
    fn test_save_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let saved = save_model_with_metadata(&dir.path().join("model"), &sample_metadata(), b"weights").unwrap();
        assert_eq!(saved, dir.path().join("model.tar.gz"));
        assert!(saved.exists());
    }

    #[test]
    fn test_load_model_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/model.tar.gz");
        let metadata = sample_metadata();
        save_model_with_metadata(&path, &metadata, b"weights").unwrap();

        let (loaded, binary) = load_model_with_metadata(&path).unwrap();
        assert_eq!(loaded, metadata);
        assert_eq!(binary, b"weights");
        assert_eq!(load_metadata(&path).unwrap(), metadata);
    }

    #[test]
    fn test_missing_file() {
        let err = load_model_with_metadata(Path::new("/nonexistent/model.tar.gz")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open tar.gz file"));
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tar.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();
        assert!(load_model_with_metadata(&path).is_err());
    }
}
