//! Selection Tracker and Highlight Renderer.
//!
//! [`SelectionContext`] is the single owner of every text region shown in a
//! document view and of the one active [`SelectionRange`]. Setting a range in
//! one region clears the range and highlight of all others, so at most one
//! region ever holds a selection.

mod highlight;
mod region;

use shared_types::{RegionName, SelectionRange};
use std::collections::HashMap;

pub use highlight::TextNode;
pub use region::{boundary_offset, selection_offsets, Boundary, TextRegion};

/// One end of the user's on-screen selection. `region` is `None` when the
/// point lies outside every tracked region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub region: Option<RegionName>,
    pub boundary: Boundary,
}

impl SelectionPoint {
    pub fn new(region: RegionName, node: usize, offset: usize) -> Self {
        Self {
            region: Some(region),
            boundary: Boundary::new(node, offset),
        }
    }

    pub fn outside() -> Self {
        Self {
            region: None,
            boundary: Boundary::new(0, 0),
        }
    }
}

/// Live selection as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSelection {
    pub anchor: SelectionPoint,
    pub focus: SelectionPoint,
}

impl ScreenSelection {
    pub fn within(region: RegionName, anchor: Boundary, focus: Boundary) -> Self {
        Self {
            anchor: SelectionPoint {
                region: Some(region),
                boundary: anchor,
            },
            focus: SelectionPoint {
                region: Some(region),
                boundary: focus,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionContext {
    regions: HashMap<RegionName, TextRegion>,
    active: Option<SelectionRange>,
}

impl Default for SelectionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionContext {
    pub fn new() -> Self {
        let regions = RegionName::ALL
            .into_iter()
            .map(|name| (name, TextRegion::new(name)))
            .collect();
        Self {
            regions,
            active: None,
        }
    }

    fn region_mut(&mut self, name: RegionName) -> &mut TextRegion {
        self.regions
            .entry(name)
            .or_insert_with(|| TextRegion::new(name))
    }

    pub fn region(&self, name: RegionName) -> Option<&TextRegion> {
        self.regions.get(&name)
    }

    pub fn plain_text(&self, name: RegionName) -> String {
        self.region(name)
            .map(TextRegion::plain_text)
            .unwrap_or_default()
    }

    /// Show new text in `name`. Any range or highlight in that region is
    /// dropped; ranges captured before this call are stale from now on.
    pub fn render(&mut self, name: RegionName, text: &str) {
        self.reset(name);
        self.region_mut(name).render(text);
    }

    pub fn render_nodes<I, S>(&mut self, name: RegionName, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reset(name);
        self.region_mut(name).render_nodes(parts);
    }

    /// Map the live selection to a range in `name`.
    ///
    /// Returns `None` when the selection is collapsed or either end lies
    /// outside `name`; existing state is left untouched in that case. A
    /// non-empty capture becomes the active range and clears every other
    /// region's range and highlight.
    pub fn capture_selection(
        &mut self,
        name: RegionName,
        selection: &ScreenSelection,
    ) -> Option<SelectionRange> {
        if selection.anchor.region != Some(name) || selection.focus.region != Some(name) {
            return None;
        }
        let range = self
            .region(name)?
            .capture(selection.anchor.boundary, selection.focus.boundary)?;
        self.set_active(range);
        Some(range)
    }

    fn set_active(&mut self, range: SelectionRange) {
        for region in self.regions.values_mut() {
            if region.name() != range.region {
                region.clear_highlight();
            }
        }
        if let Some(previous) = self.active {
            if previous.region == range.region && previous != range {
                self.region_mut(range.region).clear_highlight();
            }
        }
        self.active = Some(range);
    }

    /// Mark `range` in its region. Stale ranges are discarded (`false`).
    pub fn apply_highlight(&mut self, range: &SelectionRange) -> bool {
        let accepted = self
            .region(range.region)
            .map(|region| region.accepts(range))
            .unwrap_or(false);
        if !accepted {
            tracing::debug!(
                region = %range.region,
                start = range.start,
                end = range.end,
                "Ignoring highlight for stale range"
            );
            return false;
        }
        self.set_active(*range);
        self.region_mut(range.region).apply_highlight(range)
    }

    /// Capture the live selection and highlight it in one step.
    pub fn select_and_highlight(
        &mut self,
        name: RegionName,
        selection: &ScreenSelection,
    ) -> Option<SelectionRange> {
        let range = self.capture_selection(name, selection)?;
        self.apply_highlight(&range).then_some(range)
    }

    pub fn clear_highlight(&mut self, name: RegionName) {
        if let Some(region) = self.regions.get_mut(&name) {
            region.clear_highlight();
        }
    }

    /// Drop the range and highlight held by `name`.
    pub fn reset(&mut self, name: RegionName) {
        self.clear_highlight(name);
        if self.active.map(|range| range.region) == Some(name) {
            self.active = None;
        }
    }

    pub fn reset_all(&mut self) {
        for region in self.regions.values_mut() {
            region.clear_highlight();
        }
        self.active = None;
    }

    pub fn on_edit_start(&mut self) {
        self.reset_all();
    }

    pub fn on_dialog_close(&mut self) {
        self.reset_all();
    }

    pub fn on_version_rendered(&mut self, name: RegionName, text: &str) {
        self.render(name, text);
    }

    pub fn active_range(&self) -> Option<SelectionRange> {
        self.active
    }

    /// Active range if it belongs to `name` and still matches its text.
    pub fn range_in(&self, name: RegionName) -> Option<SelectionRange> {
        self.active
            .filter(|range| range.region == name)
            .filter(|range| self.is_current(range))
    }

    pub fn is_current(&self, range: &SelectionRange) -> bool {
        self.region(range.region)
            .map(|region| region.accepts(range))
            .unwrap_or(false)
    }

    pub fn is_region_highlighted(&self, name: RegionName) -> bool {
        self.region(name)
            .map(TextRegion::is_highlighted)
            .unwrap_or(false)
    }
}
