//! Email body rendering from CMS content blocks.

use pulldown_cmark::{html, Options, Parser};

use crate::models::{ContentKind, MailContent};

const GREETING_PLACEHOLDER: &str = "〇〇";

/// Escape text for inclusion in HTML element content.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
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

fn markdown_to_html(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

/// Render one content block.
///
/// Rich-editor and html blocks are trusted CMS output and pass through as-is.
#[must_use]
pub fn render_block(block: &MailContent) -> String {
    match &block.field_id {
        ContentKind::RichEditor | ContentKind::Html => block.contents.clone(),
        ContentKind::Markdown => markdown_to_html(&block.contents),
        ContentKind::Other(_) => format!("<p>{}</p>", escape_html(&block.contents)),
    }
}

/// Full HTML email body: greeting followed by every block in order.
#[must_use]
pub fn render_email(contents: &[MailContent], recipient_name: Option<&str>) -> String {
    let name = recipient_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map_or_else(|| GREETING_PLACEHOLDER.to_string(), escape_html);

    let mut body = String::from("<div class=\"content-style\">");
    body.push_str(&format!("<p>{name}様</p>"));
    for block in contents {
        body.push_str("<div>");
        body.push_str(&render_block(block));
        body.push_str("</div>");
    }
    body.push_str("</div>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(kind: ContentKind, contents: &str) -> MailContent {
        MailContent {
            field_id: kind,
            contents: contents.to_string(),
        }
    }

    #[test]
    fn test_blocks_render_by_kind() {
        assert_eq!(render_block(&block(ContentKind::Html, "<b>x</b>")), "<b>x</b>");
        assert_eq!(render_block(&block(ContentKind::RichEditor, "<p>y</p>")), "<p>y</p>");
        assert!(render_block(&block(ContentKind::Markdown, "# Hello")).contains("<h1>Hello</h1>"));
        assert_eq!(
            render_block(&block(ContentKind::Other("text".to_string()), "a < b")),
            "<p>a &lt; b</p>"
        );
    }

    #[test]
    fn test_greeting_uses_recipient_or_placeholder() {
        let contents = [block(ContentKind::Html, "<p>news</p>")];
        let named = render_email(&contents, Some("Acme"));
        assert!(named.starts_with("<div class=\"content-style\"><p>Acme様</p>"));
        assert!(named.contains("<p>news</p>"));

        let anonymous = render_email(&contents, None);
        assert!(anonymous.contains("<p>〇〇様</p>"));
        assert!(render_email(&contents, Some("  ")).contains("〇〇様"));
    }
}
