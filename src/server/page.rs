//! フォーム画面のHTML描画（minijinja）

use base64::Engine as _;
use minijinja::{context, Environment, Value};

use crate::error::{Error, Result};
use crate::ml::{preprocess, ALLOWED_EXTENSIONS};
use crate::types::Classification;

const LAYOUT: &str = include_str!("templates/layout.html");
const INDEX: &str = include_str!("templates/index.html");
const RESULT: &str = include_str!("templates/result.html");
const ERROR: &str = include_str!("templates/error.html");

/// アップロード画像をページ埋め込み用のdata URIに変換
pub fn image_data_uri(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", preprocess::mime_type(bytes), encoded)
}

/// テンプレート一式
pub struct PageRenderer {
    env: Environment<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("layout.html", LAYOUT)?;
        env.add_template("index.html", INDEX)?;
        env.add_template("result.html", RESULT)?;
        env.add_template("error.html", ERROR)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    /// アップロードフォーム
    pub fn render_index(&self) -> Result<String> {
        let accept = ALLOWED_EXTENSIONS
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(",");
        self.render("index.html", context! { accept })
    }

    /// 分類結果
    pub fn render_result(&self, file_name: Option<&str>, bytes: &[u8], classification: &Classification) -> Result<String> {
        let entry = &classification.entry;
        // base64とMIMEタイプのみなのでエスケープ不要
        let image_src = Value::from_safe_string(image_data_uri(bytes));

        self.render(
            "result.html",
            context! {
                image_src,
                file_name => file_name.unwrap_or("uploaded image"),
                category => &entry.name,
                recyclability => entry.recyclability,
                verdict_label => entry.recyclability.to_string(),
                confidence => format!("{:.1}", classification.result.confidence() * 100.0),
                tip => &entry.tip,
                guidance => &entry.guidance,
                reuse_tip => &entry.reuse_tip,
            },
        )
    }

    /// エラー画面
    pub fn render_error(&self, error: &Error) -> Result<String> {
        self.render(
            "error.html",
            context! {
                status => error.status_code().as_u16(),
                message => error.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassEntry, InferenceResult, Recyclability};

    fn classification(name: &str, recyclability: Recyclability, reuse_tip: Option<&str>) -> Classification {
        Classification {
            result: InferenceResult { class_index: 0, scores: vec![0.875, 0.125] },
            entry: ClassEntry {
                name: name.to_string(),
                recyclability,
                tip: "Flatten boxes & keep dry".to_string(),
                guidance: "Remove tape.".to_string(),
                reuse_tip: reuse_tip.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_index_has_form() {
        let html = PageRenderer::new().unwrap().render_index().unwrap();
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("name=\"file\""));
        assert!(html.contains(".jpg,.jpeg,.png"));
    }

    #[test]
    fn test_result_page() {
        let renderer = PageRenderer::new().unwrap();
        let html = renderer
            .render_result(Some("box.png"), b"\x89PNG\r\n\x1a\nrest", &classification("cardboard", Recyclability::Recyclable, Some("Make a fort")))
            .unwrap();

        assert!(html.contains("Prediction: cardboard"));
        assert!(html.contains("class=\"verdict recyclable\""));
        assert!(html.contains("87.5%"));
        assert!(html.contains("src=\"data:image/png;base64,"));
        assert!(html.contains("Creative reuse"));
        assert!(html.contains("Flatten boxes &amp; keep dry"));
    }

    #[test]
    fn test_result_page_escapes_and_omits_reuse() {
        let renderer = PageRenderer::new().unwrap();
        let html = renderer
            .render_result(None, b"", &classification("<script>", Recyclability::Unknown, None))
            .unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("class=\"verdict unknown\""));
        assert!(html.contains("Unknown - check local rules"));
        assert!(!html.contains("Creative reuse"));
    }

    #[test]
    fn test_error_page() {
        let renderer = PageRenderer::new().unwrap();
        let html = renderer.render_error(&Error::MissingInput).unwrap();
        assert!(html.contains("400: No file uploaded"));
    }

    #[test]
    fn test_image_data_uri() {
        assert_eq!(image_data_uri(b"abc"), "data:application/octet-stream;base64,YWJj");
    }
}
