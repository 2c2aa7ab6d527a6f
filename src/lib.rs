//! 廃棄物画像の分類サーバ
//!
//! アップロードされた画像を学習済みCNNで分類し、リサイクル可否と分別のヒントを
//! JSON またはHTMLページで返します。

pub mod types;
pub mod error;
pub mod model;
pub mod ml;
pub mod catalog;
pub mod pipeline;
pub mod server;

pub use error::{Error, Result};
