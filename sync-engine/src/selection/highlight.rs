//! Highlight rendering over a region's text nodes.
//!
//! Highlighting only splits nodes and flips their `highlighted` flag; the
//! concatenated text never changes, so offsets computed afterwards are the
//! same as before.

/// One rendered run of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNode {
    pub text: String,
    pub highlighted: bool,
}

impl TextNode {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: false,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Byte index of the `char_idx`-th character, or `s.len()` past the end.
fn byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

/// Split `nodes` so that exactly the characters in `[start, end)` sit in
/// highlighted nodes. Nodes outside the span keep their flag.
pub fn mark_span(nodes: &[TextNode], start: usize, end: usize) -> Vec<TextNode> {
    let mut marked = Vec::with_capacity(nodes.len() + 2);
    let mut node_start = 0usize;

    for node in nodes {
        let len = node.char_len();
        let node_end = node_start + len;

        if node_end <= start || node_start >= end {
            marked.push(node.clone());
            node_start = node_end;
            continue;
        }

        let inner_start = start.saturating_sub(node_start).min(len);
        let inner_end = (end - node_start).min(len);
        let head_at = byte_index(&node.text, inner_start);
        let tail_at = byte_index(&node.text, inner_end);

        let pieces = [
            (&node.text[..head_at], node.highlighted),
            (&node.text[head_at..tail_at], true),
            (&node.text[tail_at..], node.highlighted),
        ];
        for (text, highlighted) in pieces {
            if !text.is_empty() {
                marked.push(TextNode {
                    text: text.to_string(),
                    highlighted,
                });
            }
        }
        node_start = node_end;
    }

    marked
}

pub fn concat(nodes: &[TextNode]) -> String {
    nodes.iter().map(|node| node.text.as_str()).collect()
}

fn escape_html(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

/// HTML for the region body; highlighted runs are wrapped in a
/// non-semantic `<span class="selection-highlight">`.
pub fn to_html(nodes: &[TextNode]) -> String {
    let mut html = String::new();
    for node in nodes {
        if node.highlighted {
            html.push_str(r#"<span class="selection-highlight">"#);
            escape_html(&node.text, &mut html);
            html.push_str("</span>");
        } else {
            escape_html(&node.text, &mut html);
        }
    }
    html
}
