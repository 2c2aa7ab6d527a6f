pub mod model_metadata;
pub mod model_storage;
pub mod inference_config;
pub mod config;

pub use model_metadata::{ModelMetadata, DEFAULT_INPUT_SIZE};
pub use model_storage::{save_model_with_metadata, load_metadata, load_model_with_metadata, print_metadata_info};
pub use inference_config::{InferenceConfig, load_class_indices, invert_class_indices};
pub use config::{AppConfig, DeviceType, ModelSettings, OutputMode, ServerSettings};
