//! Chat page rendering with Tera
//!
//! The page template is compiled into the binary and registered under an
//! `.html` name, so every value interpolated into it is HTML-escaped.

use tera::{Context, Tera};

use super::transcript::Line;

const PAGE: &str = "chat.html";

pub struct PageRenderer {
    tera: Tera,
}

impl PageRenderer {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html"]);
        tera.add_raw_template(PAGE, include_str!("../../templates/chat.html"))?;

        Ok(Self { tera })
    }

    /// Render the full page: header, end button, transcript, pending error, input.
    pub fn page(&self, lines: &[Line], error: Option<&str>) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("lines", lines);
        context.insert("error", &error);

        self.tera.render(PAGE, &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::transcript::Transcript;

    fn renderer() -> PageRenderer {
        PageRenderer::new().unwrap()
    }

    #[test]
    fn test_page_lists_transcript_in_order() {
        let mut transcript = Transcript::new();
        transcript.push_exchange("what is a tag?", "a piece of markup");

        let html = renderer().page(transcript.entries(), None).unwrap();
        let you = html.find("what is a tag?").unwrap();
        let bot = html.find("a piece of markup").unwrap();
        assert!(you < bot);
        assert!(html.contains("class=\"line you\""));
        assert!(html.contains("class=\"line bot\""));
        assert!(html.contains("Ask me anything!!"));
        assert!(html.contains("End Conversation"));
        assert!(!html.contains("Error talking to chatbot"));
    }

    #[test]
    fn test_user_text_is_escaped() {
        let mut transcript = Transcript::new();
        transcript.push_exchange("<script>alert(1)</script>", "<b>bold</b> & done");

        let html = renderer()
            .page(transcript.entries(), Some("<i>refused</i>"))
            .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<b>bold"));
        assert!(html.contains("&amp; done"));
        assert!(!html.contains("<i>refused"));
    }

    #[test]
    fn test_page_shows_error() {
        let html = renderer().page(&[], Some("connection refused")).unwrap();
        assert!(html.contains("Error talking to chatbot: connection refused"));
    }
}
