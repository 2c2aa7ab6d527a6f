//! モデル推論機能

use std::path::Path;
use std::sync::{Arc, Mutex};

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{Error, Result};
use crate::ml::ml_model::{ModelConfig, WasteNet};
use crate::model::{load_model_with_metadata, DeviceType, ModelMetadata};
use crate::types::{ImageTensor, InferenceResult};

/// 前処理済み画像を分類するもの
///
/// パイプラインはこのトレイト越しに分類器を使う（テストではスタブに差し替える）
pub trait ImageClassifier: Send + Sync {
    /// 出力クラス数
    fn num_classes(&self) -> usize;

    /// 1枚分のテンソル [1, 3, H, W] を分類
    fn classify(&self, input: &ImageTensor) -> Result<InferenceResult>;
}

/// スコア列の最大値のインデックス
///
/// 同値の場合は小さいインデックスを優先し、NaNは選ばない
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((i, score)),
        })
        .map(|(i, _)| i)
}

/// 推論エンジン
///
/// モデルは起動時に1度だけ読み込み、以降は読み取り専用。
/// バックエンドが Sync を保証しないため Mutex で保護する。
pub struct InferenceEngine<B: Backend> {
    model: Mutex<WasteNet<B>>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデル成果物（tar.gz）を読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let model_path = model_path.as_ref();
        let load_error = |e: anyhow::Error| Error::ModelLoad(format!("{}: {:#}", model_path.display(), e));

        let (metadata, model_binary) = load_model_with_metadata(model_path).map_err(load_error)?;
        metadata.validate().map_err(load_error)?;

        let model = ModelConfig::new(metadata.num_classes())
            .init_with_bytes::<B>(model_binary, &device)
            .map_err(load_error)?;

        let engine = Self::from_parts(model, metadata, device)?;
        tracing::info!(
            path = %model_path.display(),
            classes = engine.metadata.num_classes(),
            input_size = engine.metadata.model_input_size,
            "モデルを読み込みました"
        );
        Ok(engine)
    }

    /// 構築済みのモデルから作成
    ///
    /// 出力クラス数がメタデータのラベル数と一致しない場合はエラー
    pub fn from_parts(model: WasteNet<B>, metadata: ModelMetadata, device: B::Device) -> Result<Self> {
        if model.num_classes() != metadata.num_classes() {
            return Err(Error::ModelLoad(format!(
                "model has {} outputs but metadata lists {} class labels",
                model.num_classes(),
                metadata.num_classes()
            )));
        }

        Ok(Self {
            model: Mutex::new(model),
            metadata,
            device,
        })
    }

    /// メタデータへの参照を取得
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn check_input(&self, input: &ImageTensor) -> Result<()> {
        let size = self.metadata.model_input_size as usize;
        let expected = [1, 3, size, size];
        if input.shape != expected {
            return Err(Error::Inference(format!(
                "input shape {:?} does not match expected {:?}",
                input.shape, expected
            )));
        }
        if input.data.len() != input.shape.iter().product::<usize>() {
            return Err(Error::Inference(format!(
                "input has {} values for shape {:?}",
                input.data.len(),
                input.shape
            )));
        }
        Ok(())
    }
}

impl<B: Backend> ImageClassifier for InferenceEngine<B> {
    fn num_classes(&self) -> usize {
        self.metadata.num_classes()
    }

    fn classify(&self, input: &ImageTensor) -> Result<InferenceResult> {
        self.check_input(input)?;

        let tensor = Tensor::<B, 1>::from_floats(input.data.as_slice(), &self.device).reshape(input.shape);

        let probabilities = {
            let model = self
                .model
                .lock()
                .map_err(|_| Error::Inference("model lock poisoned".to_string()))?;
            model.probabilities(tensor)
        };

        let scores = probabilities
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| Error::Inference(format!("推論結果の取得エラー: {:?}", e)))?;

        let class_index = argmax(&scores)
            .ok_or_else(|| Error::Inference("model produced no usable scores".to_string()))?;

        Ok(InferenceResult { class_index, scores })
    }
}

/// 読み込み済みのモデル
pub struct LoadedModel {
    pub classifier: Arc<dyn ImageClassifier>,
    pub metadata: ModelMetadata,
}

fn load_with<B: Backend>(model_path: &Path, device: B::Device) -> Result<LoadedModel> {
    let engine = InferenceEngine::<B>::load(model_path, device)?;
    let metadata = engine.metadata().clone();
    Ok(LoadedModel {
        classifier: Arc::new(engine),
        metadata,
    })
}

/// 設定されたデバイスでモデルを読み込む
///
/// `wgpu` フィーチャ無しでビルドされている場合、Wgpu指定はCPUにフォールバックする
pub fn load_for_device(device_type: DeviceType, model_path: &Path) -> Result<LoadedModel> {
    match device_type {
        DeviceType::Cpu => load_with::<crate::ml::CpuBackend>(model_path, Default::default()),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => load_with::<crate::ml::GpuBackend>(model_path, Default::default()),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => {
            tracing::warn!("wgpu フィーチャ無しでビルドされています。CPUで推論します");
            load_with::<crate::ml::CpuBackend>(model_path, Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::CpuBackend;
    use crate::model::save_model_with_metadata;
    use crate::types::ChannelOrder;

    const SIZE: u32 = 32;

    fn labels() -> Vec<String> {
        ["cardboard", "glass", "metal"].iter().map(|s| s.to_string()).collect()
    }

    fn engine() -> InferenceEngine<CpuBackend> {
        let device = Default::default();
        let model = ModelConfig::new(3).init::<CpuBackend>(&device);
        let metadata = ModelMetadata::new(labels(), SIZE, ChannelOrder::Rgb);
        InferenceEngine::from_parts(model, metadata, device).unwrap()
    }

    fn input(value: f32) -> ImageTensor {
        let size = SIZE as usize;
        ImageTensor {
            data: (0..3 * size * size).map(|i| (i % 7) as f32 / 7.0 * value).collect(),
            shape: [1, 3, size, size],
        }
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5, 0.1]), Some(0));
        assert_eq!(argmax(&[f32::NAN, 0.2, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let engine = engine();
        let first = engine.classify(&input(1.0)).unwrap();
        let second = engine.classify(&input(1.0)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.scores.len(), 3);
        assert!(first.class_index < 3);
        assert_eq!(Some(first.class_index), argmax(&first.scores));
        let sum: f32 = first.scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_shape_mismatch_is_inference_error() {
        let engine = engine();
        let wrong = ImageTensor { data: vec![0.0; 3 * 8 * 8], shape: [1, 3, 8, 8] };
        assert!(matches!(engine.classify(&wrong), Err(Error::Inference(_))));

        let truncated = ImageTensor { data: vec![0.0; 10], shape: [1, 3, 32, 32] };
        assert!(matches!(engine.classify(&truncated), Err(Error::Inference(_))));
    }

    #[test]
    fn test_label_count_mismatch() {
        let device = Default::default();
        let model = ModelConfig::new(5).init::<CpuBackend>(&device);
        let metadata = ModelMetadata::new(labels(), SIZE, ChannelOrder::Rgb);
        assert!(matches!(
            InferenceEngine::from_parts(model, metadata, device),
            Err(Error::ModelLoad(_))
        ));
    }

    #[test]
    fn test_load_from_artifact_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let in_memory = engine();
        let bytes = in_memory.model.lock().unwrap().to_bytes().unwrap();
        let path = save_model_with_metadata(&dir.path().join("model.tar.gz"), in_memory.metadata(), &bytes).unwrap();

        let loaded = InferenceEngine::<CpuBackend>::load(&path, Default::default()).unwrap();
        assert_eq!(loaded.metadata(), in_memory.metadata());
        assert_eq!(
            loaded.classify(&input(0.5)).unwrap(),
            in_memory.classify(&input(0.5)).unwrap()
        );
    }

    #[test]
    fn test_missing_artifact_is_model_load_error() {
        let result = InferenceEngine::<CpuBackend>::load("/nonexistent/waste.tar.gz", Default::default());
        assert!(matches!(result, Err(Error::ModelLoad(_))));

        let result = load_for_device(DeviceType::Cpu, Path::new("/nonexistent/waste.tar.gz"));
        assert!(matches!(result, Err(Error::ModelLoad(_))));
    }
}
