//! HTML-to-text extraction for rendered wiki bodies.
//!
//! Confluence's `body.view` is rendered HTML. The corpus only needs readable
//! plain text, so this is a tag stripper with entity decoding, not an HTML
//! parser.

use regex::Regex;

/// Strip markup from rendered page HTML and collapse all whitespace runs
/// to single spaces.
pub fn html_to_text(html: &str) -> String {
    let script_style_re =
        Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").expect("valid regex");
    let tag_re = Regex::new(r"(?s)<[^>]*>").expect("valid regex");

    let without_blocks = script_style_re.replace_all(html, " ");
    let without_tags = tag_re.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);
    collapse_whitespace(&decoded)
}

/// Collapse every run of whitespace (including newlines) to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the handful of entities Confluence actually emits in view bodies.
fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        let html = "<h1>Naming</h1>\n<p>Use   <b>kebab-case</b>\n for endpoints.</p>";
        assert_eq!(html_to_text(html), "Naming Use kebab-case for endpoints.");
    }

    #[test]
    fn drops_script_and_style_content() {
        let html = "<p>keep</p><script>var x = 1;</script><style>p{}</style><p>this</p>";
        assert_eq!(html_to_text(html), "keep this");
    }

    #[test]
    fn decodes_common_entities() {
        let html = "<p>a &amp; b&nbsp;&lt;ok&gt;</p>";
        assert_eq!(html_to_text(html), "a & b <ok>");
    }

    #[test]
    fn empty_body_yields_empty_text() {
        assert_eq!(html_to_text(""), "");
    }
}
