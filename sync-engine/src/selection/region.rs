//! A named text region and the mapping between on-screen selection
//! boundaries and plain-text character offsets.

use shared_types::{RegionName, SelectionRange};

use super::highlight::{self, TextNode};

/// Position inside a region's rendered nodes, as reported by the UI:
/// index of the text node and a character offset within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: usize,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: usize, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Plain-text offset of `boundary` given the lengths of the region's text
/// nodes in document order. `None` if the boundary is not inside the nodes.
pub fn boundary_offset(node_lengths: &[usize], boundary: Boundary) -> Option<usize> {
    let len = *node_lengths.get(boundary.node)?;
    if boundary.offset > len {
        return None;
    }
    let preceding: usize = node_lengths[..boundary.node].iter().sum();
    Some(preceding + boundary.offset)
}

/// Ordered `(start, end)` for two boundaries; `None` when collapsed or
/// when either boundary falls outside the nodes.
pub fn selection_offsets(
    node_lengths: &[usize],
    anchor: Boundary,
    focus: Boundary,
) -> Option<(usize, usize)> {
    let a = boundary_offset(node_lengths, anchor)?;
    let b = boundary_offset(node_lengths, focus)?;
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    (start < end).then_some((start, end))
}

#[derive(Debug, Clone)]
pub struct TextRegion {
    name: RegionName,
    nodes: Vec<TextNode>,
    /// Bumped on every render so ranges from an older render are detectable
    revision: u64,
    /// Node layout before the first highlight was applied
    pristine: Option<Vec<TextNode>>,
}

impl TextRegion {
    pub fn new(name: RegionName) -> Self {
        Self {
            name,
            nodes: Vec::new(),
            revision: 0,
            pristine: None,
        }
    }

    pub fn name(&self) -> RegionName {
        self.name
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn nodes(&self) -> &[TextNode] {
        &self.nodes
    }

    /// Replace the region content with a single text node.
    pub fn render(&mut self, text: &str) {
        self.render_nodes([text]);
    }

    /// Replace the region content with one text node per part (e.g. one per
    /// paragraph), dropping any highlight.
    pub fn render_nodes<I, S>(&mut self, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = parts.into_iter().map(TextNode::plain).collect();
        self.pristine = None;
        self.revision += 1;
    }

    pub fn plain_text(&self) -> String {
        highlight::concat(&self.nodes)
    }

    pub fn char_len(&self) -> usize {
        self.nodes.iter().map(TextNode::char_len).sum()
    }

    pub fn node_lengths(&self) -> Vec<usize> {
        self.nodes.iter().map(TextNode::char_len).collect()
    }

    pub fn is_highlighted(&self) -> bool {
        self.nodes.iter().any(|node| node.highlighted)
    }

    /// Range covered by `anchor`..`focus` in this region, in either order.
    pub fn capture(&self, anchor: Boundary, focus: Boundary) -> Option<SelectionRange> {
        let (start, end) = selection_offsets(&self.node_lengths(), anchor, focus)?;
        SelectionRange::new(self.name, start, end, self.revision)
    }

    /// Whether `range` was captured against the text currently rendered.
    pub fn accepts(&self, range: &SelectionRange) -> bool {
        range.region == self.name
            && range.revision == self.revision
            && range.fits(self.char_len())
    }

    /// Mark `range`. Stale ranges are discarded and `false` is returned.
    pub fn apply_highlight(&mut self, range: &SelectionRange) -> bool {
        if !self.accepts(range) {
            tracing::debug!(
                region = %self.name,
                start = range.start,
                end = range.end,
                range_revision = range.revision,
                revision = self.revision,
                "Discarding stale selection range"
            );
            return false;
        }

        // Only one highlight per region.
        self.clear_highlight();
        self.pristine = Some(self.nodes.clone());
        self.nodes = highlight::mark_span(&self.nodes, range.start, range.end);
        true
    }

    /// Restore the exact node layout held before highlighting.
    pub fn clear_highlight(&mut self) {
        if let Some(pristine) = self.pristine.take() {
            self.nodes = pristine;
        }
    }

    pub fn to_html(&self) -> String {
        highlight::to_html(&self.nodes)
    }
}
