pub mod ml_model;
pub mod preprocess;
pub mod inference;

pub use ml_model::{ModelConfig, WasteNet};
pub use preprocess::{Preprocessor, ALLOWED_EXTENSIONS};
pub use inference::{argmax, load_for_device, ImageClassifier, InferenceEngine, LoadedModel};

/// CPU推論用バックエンド
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// GPU推論用バックエンド
#[cfg(feature = "wgpu")]
pub type GpuBackend = burn::backend::Wgpu;
