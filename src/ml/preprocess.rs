//! 画像前処理
//!
//! アップロードされた画像バイト列をモデル入力テンソル [1, 3, H, W] に変換します。
//! デコード → チャンネル順の正規化 → リサイズ（バイリニア）→ 0〜1へのスケーリング の順に処理します。

use image::{imageops::FilterType, ImageFormat, RgbImage};

use crate::error::{Error, Result};
use crate::model::InferenceConfig;
use crate::types::{ChannelOrder, ImageTensor};

/// フォームで受け付ける拡張子
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 前処理の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    size: u32,
    channel_order: ChannelOrder,
}

impl Preprocessor {
    pub fn new(size: u32, channel_order: ChannelOrder) -> Self {
        Self { size, channel_order }
    }

    /// 推論設定（モデルメタデータ由来）から作成
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self::new(config.model_input_size, config.channel_order)
    }

    pub fn input_size(&self) -> u32 {
        self.size
    }

    /// 出力テンソルの形状
    pub fn output_shape(&self) -> [usize; 4] {
        [1, 3, self.size as usize, self.size as usize]
    }

    /// 画像バイト列をテンソルに変換
    ///
    /// デコードに失敗した場合は `Error::Decode` を返し、部分的なテンソルは作らない
    pub fn process(&self, bytes: &[u8]) -> Result<ImageTensor> {
        let image = decode_rgb(bytes)?;
        let resized = image::imageops::resize(&image, self.size, self.size, FilterType::Triangle);
        Ok(self.to_tensor(&resized))
    }

    /// RGB画像を (C, H, W) の順で平坦化し、255で割って0〜1にする
    fn to_tensor(&self, image: &RgbImage) -> ImageTensor {
        let (width, height) = image.dimensions();
        let plane = (width * height) as usize;
        let mut data = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = (y * width + x) as usize;
            for channel in 0..3 {
                let source = match self.channel_order {
                    ChannelOrder::Rgb => channel,
                    ChannelOrder::Bgr => 2 - channel,
                };
                data[channel * plane + offset] = pixel[source] as f32 / 255.0;
            }
        }

        ImageTensor {
            data,
            shape: [1, 3, height as usize, width as usize],
        }
    }
}

/// 画像バイト列を3チャンネルRGBにデコード（アルファは破棄、グレースケールは展開）
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// 内容から画像形式を推定
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// 画面表示用のMIMEタイプ
pub fn mime_type(bytes: &[u8]) -> &'static str {
    sniff_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// フォームからのアップロードが jpg / jpeg / png か確認
///
/// ファイル名に拡張子があればそれで判定し、無ければ内容から推定する
pub fn check_upload_type(file_name: Option<&str>, bytes: &[u8]) -> Result<()> {
    let extension = file_name
        .and_then(|name| Some(std::path::Path::new(name).extension()?.to_str()?.to_lowercase()));

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        Some(ext) => Err(Error::UnsupportedFileType(ext)),
        None => match sniff_format(bytes) {
            Some(ImageFormat::Jpeg) | Some(ImageFormat::Png) => Ok(()),
            Some(format) => Err(Error::UnsupportedFileType(format!("{:?}", format).to_lowercase())),
            None => Err(Error::UnsupportedFileType("unknown".to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_output_shape_and_range() {
        let mut image = solid(37, 91, [0, 0, 0]);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 7) as u8, (y * 3) as u8, 255]);
        }
        let bytes = encode(&image, ImageFormat::Png);

        let preprocessor = Preprocessor::new(224, ChannelOrder::Rgb);
        let tensor = preprocessor.process(&bytes).unwrap();

        assert_eq!(tensor.shape, [1, 3, 224, 224]);
        assert_eq!(tensor.shape, preprocessor.output_shape());
        assert_eq!(tensor.data.len(), 3 * 224 * 224);
        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_rgb_channel_order() {
        let bytes = encode(&solid(10, 7, [255, 0, 0]), ImageFormat::Png);
        let tensor = Preprocessor::new(16, ChannelOrder::Rgb).process(&bytes).unwrap();

        let plane = 16 * 16;
        assert!(tensor.data[..plane].iter().all(|v| *v > 0.99));
        assert!(tensor.data[plane..].iter().all(|v| *v < 0.01));
    }

    #[test]
    fn test_bgr_channel_order() {
        let bytes = encode(&solid(10, 7, [255, 0, 0]), ImageFormat::Png);
        let tensor = Preprocessor::new(16, ChannelOrder::Bgr).process(&bytes).unwrap();

        let plane = 16 * 16;
        assert!(tensor.data[..2 * plane].iter().all(|v| *v < 0.01));
        assert!(tensor.data[2 * plane..].iter().all(|v| *v > 0.99));
    }

    #[test]
    fn test_jpeg_input() {
        let bytes = encode(&solid(64, 48, [10, 200, 30]), ImageFormat::Jpeg);
        let tensor = Preprocessor::new(32, ChannelOrder::Rgb).process(&bytes).unwrap();
        assert_eq!(tensor.shape, [1, 3, 32, 32]);
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 0]));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();

        let tensor = Preprocessor::new(8, ChannelOrder::Rgb).process(&bytes).unwrap();
        assert_eq!(tensor.data.len(), 3 * 8 * 8);
        assert!(tensor.data[2 * 64..].iter().all(|v| *v > 0.99));
    }

    #[test]
    fn test_invalid_bytes_fail_with_decode_error() {
        let preprocessor = Preprocessor::new(224, ChannelOrder::Rgb);
        let inputs: [&[u8]; 3] = [b"", b"hello, this is plain text", &[0xFF, 0xD8, 0xFF, 0x00, 0x01]];
        for bytes in inputs {
            assert!(matches!(preprocessor.process(bytes), Err(Error::Decode(_))));
        }
    }

    #[test]
    fn test_check_upload_type() {
        let png = encode(&solid(2, 2, [1, 2, 3]), ImageFormat::Png);

        assert!(check_upload_type(Some("box.JPG"), b"anything").is_ok());
        assert!(check_upload_type(Some("box.png"), &png).is_ok());
        assert!(matches!(
            check_upload_type(Some("box.gif"), &png),
            Err(Error::UnsupportedFileType(ext)) if ext == "gif"
        ));
        assert!(check_upload_type(None, &png).is_ok());
        assert!(check_upload_type(Some("no_extension"), b"plain text").is_err());
    }

    #[test]
    fn test_mime_type() {
        let png = encode(&solid(2, 2, [1, 2, 3]), ImageFormat::Png);
        assert_eq!(mime_type(&png), "image/png");
        assert_eq!(mime_type(b"text"), "application/octet-stream");
    }
}
