use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::negotiate::ViewSelection;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("render failed: {0}")]
    Failed(String),
}

/// Produces HTML for a selected error view
#[async_trait]
pub trait ViewRenderer: Send + Sync {
    async fn render(&self, view: &ViewSelection) -> Result<String, RenderError>;
}

/// Minimal built-in renderer
///
/// Templates registered with [`HtmlRenderer::with_template`] may use the
/// `{{status}}`, `{{code}}`, `{{message}}` and `{{request_uri}}` placeholders;
/// values are HTML-escaped. Unregistered templates fall back to a plain
/// built-in page unless the renderer is strict.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    templates: HashMap<String, String>,
    strict: bool,
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    /// Fail on templates that were never registered
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn fallback_page(view: &ViewSelection) -> String {
        let title = format!(
            "{} {}",
            view.status.as_u16(),
            view.status.canonical_reason().unwrap_or("Error")
        );
        format!(
            "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n<p>{message}</p>\n</body>\n</html>\n",
            title = escape_html(&title),
            message = escape_html(view.result.message()),
        )
    }
}

#[async_trait]
impl ViewRenderer for HtmlRenderer {
    async fn render(&self, view: &ViewSelection) -> Result<String, RenderError> {
        let Some(source) = self.templates.get(&view.template) else {
            if self.strict {
                return Err(RenderError::TemplateNotFound(view.template.clone()));
            }
            return Ok(Self::fallback_page(view));
        };

        let request_uri = view
            .context
            .as_ref()
            .map(|c| c.request_uri())
            .unwrap_or_default();

        Ok(source
            .replace("{{status}}", view.status.as_str())
            .replace("{{code}}", &escape_html(view.result.code()))
            .replace("{{message}}", &escape_html(view.result.message()))
            .replace("{{request_uri}}", &escape_html(request_uri)))
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
