//! HTML to text.
//!
//! Walks the parsed DOM in document order. Non-content elements are
//! skipped, inline whitespace is collapsed, and block-level elements are
//! separated by blank lines so paragraph structure survives into chunking.

use scraper::{ElementRef, Html, Node};

const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "svg", "head", "iframe"];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "thead", "tfoot", "tr", "ul",
];

pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = TextSink::default();
    walk(document.root_element(), &mut out, false);
    out.finish()
}

#[derive(Default)]
struct TextSink {
    buf: String,
    pending_space: bool,
}

impl TextSink {
    fn push_inline(&mut self, text: &str, preformatted: bool) {
        if preformatted {
            self.buf.push_str(text);
            self.pending_space = false;
            return;
        }
        if text.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (i, word) in text.split_whitespace().enumerate() {
            if (i > 0 || self.pending_space) && !self.buf.is_empty() && !self.buf.ends_with(char::is_whitespace) {
                self.buf.push(' ');
            }
            self.buf.push_str(word);
            self.pending_space = false;
        }
        if text.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn break_block(&mut self) {
        let trimmed = self.buf.trim_end_matches([' ', '\t']).len();
        self.buf.truncate(trimmed);
        if !self.buf.is_empty() && !self.buf.ends_with("\n\n") {
            self.buf.push_str(if self.buf.ends_with('\n') { "\n" } else { "\n\n" });
        }
        self.pending_space = false;
    }

    fn line_break(&mut self) {
        self.buf.push('\n');
        self.pending_space = false;
    }

    fn finish(self) -> String {
        self.buf.trim().to_string()
    }
}

fn walk(element: ElementRef<'_>, out: &mut TextSink, preformatted: bool) {
    let tag = element.value().name();
    if SKIPPED.contains(&tag) {
        return;
    }
    let is_block = BLOCKS.contains(&tag);
    let preformatted = preformatted || tag == "pre";

    if is_block {
        out.break_block();
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_inline(text, preformatted),
            Node::Element(el) => {
                if el.name() == "br" {
                    out.line_break();
                } else if matches!(el.name(), "td" | "th") {
                    if let Some(cell) = ElementRef::wrap(child) {
                        if !out.buf.is_empty() && !out.buf.ends_with(['\n', ' ']) {
                            out.buf.push_str(" | ");
                        }
                        walk(cell, out, preformatted);
                    }
                } else if let Some(child_el) = ElementRef::wrap(child) {
                    walk(child_el, out, preformatted);
                }
            }
            _ => {}
        }
    }
    if is_block {
        out.break_block();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_script_style_and_head() {
        let html = "<html><head><title>T</title><style>p{}</style></head>\
                    <body><script>var x = 1;</script><p>Visible text.</p></body></html>";
        assert_eq!(html_to_text(html), "Visible text.");
    }

    #[test]
    fn test_blocks_become_paragraphs() {
        let html = "<h1>Title</h1><p>First   para\n with <b>bold</b> words.</p><div>Second</div>";
        assert_eq!(html_to_text(html), "Title\n\nFirst para with bold words.\n\nSecond");
    }

    #[test]
    fn test_line_breaks_and_lists() {
        let html = "<p>line one<br>line two</p><ul><li>a</li><li>b</li></ul>";
        assert_eq!(html_to_text(html), "line one\nline two\n\na\n\nb");
    }

    #[test]
    fn test_table_cells_joined() {
        let html = "<table><tr><th>Name</th><th>Qty</th></tr><tr><td>Apple</td><td>3</td></tr></table>";
        assert_eq!(html_to_text(html), "Name | Qty\n\nApple | 3");
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(html_to_text("<p>Fish &amp; chips &lt;3</p>"), "Fish & chips <3");
    }
}
