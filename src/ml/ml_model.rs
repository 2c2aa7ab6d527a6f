//! 機械学習モデルの共通定義
//!
//! 廃棄物画像分類用のCNNモデルと関連する設定を提供します。
//! 学習はこのクレートの外で行い、ここでは学習済みの重みを読み込んで推論だけを行います。

use anyhow::Result;
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// 最終畳み込み層のチャンネル数
const FEATURE_CHANNELS: usize = 128;

/// モデル設定
///
/// 入力解像度はメタデータ側で管理する（ネットワーク自体はサイズに依存しない）
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
}

impl ModelConfig {
    /// モデルを初期化（重みはランダム）
    pub fn init<B: Backend>(&self, device: &B::Device) -> WasteNet<B> {
        let hidden = FEATURE_CHANNELS / 2;

        WasteNet {
            // Conv1: 3x3 (same padding)
            conv1: Conv2dConfig::new([3, 32], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            // Conv2: 3x3 (same padding)
            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            // Conv3: 3x3 (same padding)
            conv3: Conv2dConfig::new([64, FEATURE_CHANNELS], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),

            // 入力サイズに依存しないよう全体平均プーリングで 128 次元に落とす
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),

            fc1: LinearConfig::new(FEATURE_CHANNELS, hidden).init(device),
            fc2: LinearConfig::new(hidden, self.num_classes).init(device),

            activation: Relu::new(),
        }
    }

    /// 保存済みの重み（named-msgpack）からモデルを復元
    pub fn init_with_bytes<B: Backend>(&self, bytes: Vec<u8>, device: &B::Device) -> Result<WasteNet<B>> {
        let recorder = NamedMpkBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(bytes, device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

        Ok(self.init::<B>(device).load_record(record))
    }
}

/// 廃棄物分類用CNNモデル
///
/// 任意サイズのRGB画像を任意のクラス数に分類します。
///
/// # アーキテクチャ
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 2層
/// - Conv 3x3 + ReLU
/// - Global Average Pooling -> 128
/// - FC: 128 -> 64 + ReLU
/// - FC: 64 -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct WasteNet<B: Backend> {
    conv1: Conv2d<B>, // 3 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>, // 32 -> 64
    pool2: MaxPool2d,
    conv3: Conv2d<B>, // 64 -> 128
    gap: AdaptiveAvgPool2d,

    fc1: Linear<B>, // 128 -> 64
    fc2: Linear<B>, // 64 -> num_classes

    activation: Relu,
}

impl<B: Backend> WasteNet<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 3, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);

        // [batch, 128, 1, 1] -> [batch, 128]
        let x = self.gap.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    ///
    /// 最大値の選択は呼び出し側（`ml::argmax`）で行う
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 出力クラス数（最終層の重みの形状から取得）
    pub fn num_classes(&self) -> usize {
        self.fc2.weight.val().dims()[1]
    }

    /// 重みを named-msgpack 形式のバイト列に変換
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.clone().into_record(), ())
            .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
    }
}
