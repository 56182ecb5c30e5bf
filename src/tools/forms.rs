//! Court form PDF generation
//!
//! Letter-size pages laid out in points from the top-left margin: court
//! header, title, subtitle, one bold label with an underline per field, then
//! an optional italic instructions block.

use async_trait::async_trait;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, Pt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::types::Tool;
use crate::errors::{LexiError, Result};
use crate::llm::ToolDefinition;

pub const GENERATE_COURT_FORM: &str = "generate_court_form";

pub const DEFAULT_SUBTITLE: &str = "Supreme Court of Victoria";

pub const DEFAULT_FIELDS: [&str; 9] = [
    "Case Number",
    "Applicant's Name",
    "Respondent's Name",
    "Court Case Number",
    "Date of Filing",
    "Details of Opposition",
    "Grounds for Opposition",
    "Supporting Documents",
    "Contact Information",
];

const PAGE_WIDTH_PT: f32 = 612.0;
const PAGE_HEIGHT_PT: f32 = 792.0;
const LEFT_PT: f32 = 50.0;
const TOP_PT: f32 = 750.0;
const FIELD_BOTTOM_PT: f32 = 100.0;
const INSTRUCTIONS_BOTTOM_PT: f32 = 150.0;
const LINE_BOTTOM_PT: f32 = 50.0;
const UNDERLINE_LEN: usize = 70;

/// What to put on the form
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FormRequest {
    pub title: String,
    #[serde(default = "default_subtitle")]
    pub subtitle: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub instructions: String,
}

fn default_subtitle() -> String {
    DEFAULT_SUBTITLE.to_string()
}

impl FormRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: default_subtitle(),
            fields: None,
            instructions: String::new(),
        }
    }

    fn field_labels(&self) -> Vec<String> {
        match &self.fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontStyle {
    Regular,
    Bold,
    Italic,
}

/// One string placed on a page
#[derive(Debug, Clone, PartialEq)]
struct TextOp {
    text: String,
    size: f32,
    style: FontStyle,
    y: f32,
}

/// Lay the form out into pages of text operations
fn layout(request: &FormRequest) -> Vec<Vec<TextOp>> {
    let mut pages: Vec<Vec<TextOp>> = vec![Vec::new()];
    let put = |pages: &mut Vec<Vec<TextOp>>, text: &str, size: f32, style: FontStyle, y: f32| {
        if let Some(page) = pages.last_mut() {
            page.push(TextOp {
                text: text.to_string(),
                size,
                style,
                y,
            });
        }
    };

    let mut y = TOP_PT;
    put(&mut pages, "SUPREME COURT OF VICTORIA", 14.0, FontStyle::Bold, y);
    put(&mut pages, &request.title, 14.0, FontStyle::Bold, y - 20.0);
    put(&mut pages, &request.subtitle, 14.0, FontStyle::Bold, y - 40.0);

    y -= 80.0;
    let underline = "_".repeat(UNDERLINE_LEN);
    for field in request.field_labels() {
        if y < FIELD_BOTTOM_PT {
            pages.push(Vec::new());
            y = TOP_PT;
        }
        put(&mut pages, &format!("{}:", field), 12.0, FontStyle::Bold, y);
        put(&mut pages, &underline, 12.0, FontStyle::Regular, y - 15.0);
        y -= 40.0;
    }

    if !request.instructions.is_empty() {
        if y < INSTRUCTIONS_BOTTOM_PT {
            pages.push(Vec::new());
            y = TOP_PT;
        }
        put(&mut pages, "Instructions:", 10.0, FontStyle::Italic, y - 20.0);
        y -= 35.0;
        for line in request.instructions.split('\n') {
            if y < LINE_BOTTOM_PT {
                pages.push(Vec::new());
                y = TOP_PT;
            }
            put(&mut pages, line, 10.0, FontStyle::Italic, y);
            y -= 15.0;
        }
    }

    pages
}

/// `Notice of Appeal` -> `notice_of_appeal`; path-unsafe characters dropped
pub fn form_slug(title: &str) -> String {
    let slug: String = title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if slug.is_empty() {
        "court_form".to_string()
    } else {
        slug
    }
}

/// Renders forms into a directory
#[derive(Debug, Clone)]
pub struct FormGenerator {
    forms_dir: PathBuf,
}

impl FormGenerator {
    pub fn new(forms_dir: PathBuf) -> Self {
        Self { forms_dir }
    }

    pub fn forms_dir(&self) -> &Path {
        &self.forms_dir
    }

    /// Render `request` to `{forms_dir}/{slug}.pdf`
    pub fn generate(&self, request: &FormRequest) -> Result<PathBuf> {
        if request.title.trim().is_empty() {
            return Err(LexiError::FormError("title is required".to_string()));
        }

        std::fs::create_dir_all(&self.forms_dir)?;
        let path = self.forms_dir.join(format!("{}.pdf", form_slug(&request.title)));

        let pages = layout(request);
        let (doc, first_page, first_layer) = PdfDocument::new(
            request.title.as_str(),
            Mm::from(Pt(PAGE_WIDTH_PT)),
            Mm::from(Pt(PAGE_HEIGHT_PT)),
            "Layer 1",
        );

        let font = |builtin| {
            doc.add_builtin_font(builtin)
                .map_err(|e| LexiError::FormError(e.to_string()))
        };
        let regular: IndirectFontRef = font(BuiltinFont::Helvetica)?;
        let bold: IndirectFontRef = font(BuiltinFont::HelveticaBold)?;
        let italic: IndirectFontRef = font(BuiltinFont::HelveticaOblique)?;

        for (index, ops) in pages.iter().enumerate() {
            let layer = if index == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page, layer) = doc.add_page(
                    Mm::from(Pt(PAGE_WIDTH_PT)),
                    Mm::from(Pt(PAGE_HEIGHT_PT)),
                    "Layer 1",
                );
                doc.get_page(page).get_layer(layer)
            };

            for op in ops {
                let font = match op.style {
                    FontStyle::Regular => &regular,
                    FontStyle::Bold => &bold,
                    FontStyle::Italic => &italic,
                };
                layer.use_text(op.text.as_str(), op.size, Mm::from(Pt(LEFT_PT)), Mm::from(Pt(op.y)), font);
            }
        }

        let file = File::create(&path)?;
        doc.save(&mut BufWriter::new(file))
            .map_err(|e| LexiError::FormError(e.to_string()))?;

        tracing::info!(path = %path.display(), pages = pages.len(), "court form generated");
        Ok(path)
    }
}

/// Tool wrapper reporting success or failure as text
pub struct CourtFormTool {
    generator: FormGenerator,
}

impl CourtFormTool {
    pub fn new(generator: FormGenerator) -> Self {
        Self { generator }
    }

    /// Outcome line shown to the model and the user
    pub fn run(&self, request: &FormRequest) -> String {
        match self.generator.generate(request) {
            Ok(path) => format!("✓ Form successfully generated and saved as: {}", path.display()),
            Err(e) => format!("✗ Error generating form: {}", e),
        }
    }
}

#[async_trait]
impl Tool for CourtFormTool {
    fn name(&self) -> &str {
        GENERATE_COURT_FORM
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            GENERATE_COURT_FORM,
            "Generate a fillable PDF court form based on form type and required fields.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Form title"},
                    "subtitle": {
                        "type": "string",
                        "description": "Form subtitle",
                        "default": DEFAULT_SUBTITLE
                    },
                    "fields": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of required fields for the form"
                    },
                    "instructions": {
                        "type": "string",
                        "description": "Any special instructions for completing the form"
                    }
                },
                "required": ["title"]
            }),
        )
    }

    async fn call(&self, args: Value) -> Result<String> {
        let request: FormRequest = match serde_json::from_value(args) {
            Ok(request) => request,
            Err(e) => return Ok(format!("✗ Error generating form: {}", e)),
        };

        let generator = self.generator.clone();
        let outcome = tokio::task::spawn_blocking(move || CourtFormTool::new(generator).run(&request))
            .await
            .map_err(|e| LexiError::FormError(e.to_string()))?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(form_slug("Notice of Appeal"), "notice_of_appeal");
        assert_eq!(form_slug("../../etc/passwd"), "etcpasswd");
        assert_eq!(form_slug("  "), "court_form");
    }

    #[test]
    fn test_layout_header_and_defaults() {
        let pages = layout(&FormRequest::new("Bail Application"));
        let first = &pages[0];
        assert_eq!(first[0].text, "SUPREME COURT OF VICTORIA");
        assert_eq!(first[1].text, "Bail Application");
        assert_eq!(first[2].text, DEFAULT_SUBTITLE);
        assert_eq!(first[3].text, "Case Number:");
        assert_eq!(first[3].y, 670.0);
        assert_eq!(first[4].text.len(), UNDERLINE_LEN);
        // Nine default fields fit on one page
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_layout_paginates_long_field_lists() {
        let mut request = FormRequest::new("Long Form");
        request.fields = Some((1..=20).map(|i| format!("Field {}", i)).collect());
        let pages = layout(&request);
        assert_eq!(pages.len(), 2);
        assert!(pages
            .iter()
            .flatten()
            .all(|op| op.y >= FIELD_BOTTOM_PT - 15.0));
        assert_eq!(pages[1][0].y, TOP_PT);
    }

    #[test]
    fn test_layout_instructions() {
        let mut request = FormRequest::new("Affidavit");
        request.fields = Some(vec!["Name".into()]);
        request.instructions = "Sign before a witness\nFile within 14 days".into();
        let ops: Vec<TextOp> = layout(&request).into_iter().flatten().collect();
        let italic: Vec<&str> = ops
            .iter()
            .filter(|op| op.style == FontStyle::Italic)
            .map(|op| op.text.as_str())
            .collect();
        assert_eq!(italic, vec!["Instructions:", "Sign before a witness", "File within 14 days"]);
    }

    #[test]
    fn test_generate_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FormGenerator::new(dir.path().join("forms"));
        let path = generator.generate(&FormRequest::new("Notice of Appeal")).unwrap();

        assert_eq!(path.file_name().unwrap(), "notice_of_appeal.pdf");
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_run_reports_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CourtFormTool::new(FormGenerator::new(dir.path().to_path_buf()));

        let ok = tool.run(&FormRequest::new("Summons"));
        assert!(ok.starts_with("✓ Form successfully generated and saved as: "));
        assert!(ok.ends_with("summons.pdf"));

        let err = tool.run(&FormRequest::new(""));
        assert!(err.starts_with("✗ Error generating form: "));
    }

    #[tokio::test]
    async fn test_tool_call_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CourtFormTool::new(FormGenerator::new(dir.path().to_path_buf()));
        let out = tool.call(json!({"title": "Originating Motion"})).await.unwrap();
        assert!(out.contains("originating_motion.pdf"));

        let bad = tool.call(json!({"fields": ["x"]})).await.unwrap();
        assert!(bad.starts_with("✗"));
    }
}
