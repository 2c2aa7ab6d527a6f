//! 分類パイプライン
//!
//! デコード → 前処理 → 推論 → カテゴリ変換 を1本にまとめたもの。
//! JSON出力・HTML出力のどちらもこのパイプラインを通ります。

use std::sync::Arc;

use crate::catalog::{CategoryCatalog, CategoryResolver};
use crate::error::{Error, Result};
use crate::ml::{ImageClassifier, LoadedModel, Preprocessor};
use crate::model::InferenceConfig;
use crate::types::Classification;

pub struct ClassificationPipeline {
    preprocessor: Preprocessor,
    classifier: Arc<dyn ImageClassifier>,
    resolver: CategoryResolver,
}

impl ClassificationPipeline {
    /// 部品から作成
    ///
    /// ラベル表の長さが分類器の出力数と合わない場合はエラー
    pub fn new(
        classifier: Arc<dyn ImageClassifier>,
        labels: InferenceConfig,
        catalog: CategoryCatalog,
    ) -> Result<Self> {
        if labels.num_total_classes() != classifier.num_classes() {
            return Err(Error::Config(format!(
                "label table has {} entries but the model has {} outputs",
                labels.num_total_classes(),
                classifier.num_classes()
            )));
        }

        Ok(Self {
            preprocessor: Preprocessor::from_config(&labels),
            classifier,
            resolver: CategoryResolver::new(labels, catalog),
        })
    }

    /// 読み込み済みモデルから作成（ラベルはメタデータ、または class_indices で上書き）
    pub fn from_loaded(loaded: LoadedModel, labels: Option<InferenceConfig>, catalog: CategoryCatalog) -> Result<Self> {
        let labels = labels.unwrap_or_else(|| InferenceConfig::from_metadata(&loaded.metadata));
        Self::new(loaded.classifier, labels, catalog)
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn resolver(&self) -> &CategoryResolver {
        &self.resolver
    }

    /// 画像バイト列を分類
    pub fn run(&self, bytes: &[u8]) -> Result<Classification> {
        let input = self.preprocessor.process(bytes)?;
        let result = self.classifier.classify(&input)?;
        let entry = self.resolver.resolve(result.class_index);

        tracing::info!(
            category = %entry.name,
            recyclability = ?entry.recyclability,
            confidence = result.confidence(),
            "分類完了"
        );

        Ok(Classification { result, entry })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::types::{ChannelOrder, ImageTensor, InferenceResult};
    use crate::model::ModelMetadata;

    /// 常に同じクラスを返す分類器
    pub struct FixedClassifier {
        pub class_index: usize,
        pub num_classes: usize,
    }

    impl ImageClassifier for FixedClassifier {
        fn num_classes(&self) -> usize {
            self.num_classes
        }

        fn classify(&self, input: &ImageTensor) -> Result<InferenceResult> {
            assert_eq!(input.shape[0], 1);
            let mut scores = vec![0.0; self.num_classes];
            if let Some(score) = scores.get_mut(self.class_index) {
                *score = 1.0;
            }
            Ok(InferenceResult { class_index: self.class_index, scores })
        }
    }

    pub fn labels(names: &[&str], size: u32) -> InferenceConfig {
        let metadata = ModelMetadata::new(names.iter().map(|s| s.to_string()).collect(), size, ChannelOrder::Rgb);
        InferenceConfig::from_metadata(&metadata)
    }
}
