//! Viewport windowing over a sequence of variable-height blocks.
//!
//! Only the blocks intersecting the viewport, plus `overscan` blocks either
//! side, are rendered. Sizes start out as an estimate and are replaced by real
//! measurements as blocks render, so cumulative offsets (and the total size)
//! converge over time. Offsets are recomputed lazily, from the lowest index
//! whose size changed.
//!
//! The engine is a pure add-on: with `enabled = false` the plan is
//! [`RenderPlan::Full`] and every block renders directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::segment::make_block_id;

/// Size changes smaller than this are ignored to avoid layout thrash.
pub const MEASURE_EPSILON: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualizerOptions {
    pub count: usize,
    pub estimate_size: f64,
    pub overscan: usize,
    pub enabled: bool,
    pub padding_start: f64,
    pub padding_end: f64,
}

impl Default for VirtualizerOptions {
    fn default() -> Self {
        Self {
            count: 0,
            estimate_size: 50.0,
            overscan: 5,
            enabled: true,
            padding_start: 0.0,
            padding_end: 0.0,
        }
    }
}

/// One rendered item and where it sits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualItem {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub size: f64,
    pub key: SmolStr,
}

/// Index ranges for the current scroll position. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowRange {
    pub first_visible: usize,
    pub last_visible: usize,
    /// First rendered index, overscan included.
    pub start: usize,
    /// Last rendered index, overscan included.
    pub end: usize,
}

impl WindowRange {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }
}

/// Where to put an item when scrolling to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Align {
    Start,
    Center,
    End,
    /// Scroll only as far as needed to bring the item into view.
    #[default]
    Auto,
}

/// What to render.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPlan {
    /// Windowing is off: render every block in order.
    Full { count: usize },
    /// Render these items inside a spacer of `total_size`.
    Windowed {
        items: Vec<VirtualItem>,
        total_size: f64,
    },
}

impl RenderPlan {
    /// Number of blocks this plan renders.
    pub fn len(&self) -> usize {
        match self {
            RenderPlan::Full { count } => *count,
            RenderPlan::Windowed { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices rendered, in order.
    pub fn indices(&self) -> Vec<usize> {
        match self {
            RenderPlan::Full { count } => (0..*count).collect(),
            RenderPlan::Windowed { items, .. } => items.iter().map(|i| i.index).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Virtualizer {
    options: VirtualizerOptions,
    measured: HashMap<usize, f64>,
    /// `starts[i]` is the start of item `i`; `starts[count]` is the content end.
    starts: Vec<f64>,
    /// Lowest index whose cached start may be stale.
    stale_from: Option<usize>,
    scroll_offset: f64,
    viewport_size: f64,
}

impl Virtualizer {
    pub fn new(options: VirtualizerOptions) -> Self {
        Self {
            options,
            measured: HashMap::new(),
            starts: Vec::new(),
            stale_from: Some(0),
            scroll_offset: 0.0,
            viewport_size: 0.0,
        }
    }

    pub fn options(&self) -> &VirtualizerOptions {
        &self.options
    }

    pub fn count(&self) -> usize {
        self.options.count
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.options.enabled = enabled;
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    pub fn viewport_size(&self) -> f64 {
        self.viewport_size
    }

    pub fn set_scroll_offset(&mut self, offset: f64) {
        self.scroll_offset = offset.max(0.0);
    }

    pub fn set_viewport_size(&mut self, size: f64) {
        self.viewport_size = size.max(0.0);
    }

    /// Change the item count. Measurements for removed indices are dropped.
    pub fn set_count(&mut self, count: usize) {
        let old = self.options.count;
        if count == old {
            return;
        }
        if count < old {
            self.measured.retain(|&index, _| index < count);
        }
        self.options.count = count;
        self.mark_stale(old.min(count));
        tracing::debug!(target: "vellum::window", old, new = count, "item count changed");
    }

    /// Change the estimate used for unmeasured items.
    pub fn set_estimate_size(&mut self, size: f64) {
        if (size - self.options.estimate_size).abs() >= f64::EPSILON {
            self.options.estimate_size = size;
            self.mark_stale(0);
        }
    }

    /// Current size of an item: measured if known, estimated otherwise.
    pub fn size_of(&self, index: usize) -> f64 {
        self.measured
            .get(&index)
            .copied()
            .unwrap_or(self.options.estimate_size)
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.measured.contains_key(&index)
    }

    /// Forget every measurement, as after a width change reflows all items.
    pub fn reset_measurements(&mut self) {
        self.measured.clear();
        self.mark_stale(0);
    }

    /// Record the real size of a rendered item.
    ///
    /// Returns the scroll adjustment the host should apply so content in view
    /// does not jump: non-zero only when the item starts above the current
    /// scroll offset. The adjustment is already applied to this engine's own
    /// scroll offset.
    pub fn measure(&mut self, index: usize, size: f64) -> f64 {
        if index >= self.options.count || !size.is_finite() {
            return 0.0;
        }
        let previous = self.size_of(index);
        let delta = size - previous;
        if delta.abs() < MEASURE_EPSILON {
            // Within tolerance of what we assumed; keep offsets as they are.
            self.measured.entry(index).or_insert(previous);
            return 0.0;
        }

        self.ensure_layout();
        let start = self.starts[index];
        self.measured.insert(index, size);
        self.mark_stale(index + 1);

        if start < self.scroll_offset {
            tracing::trace!(
                target: "vellum::window",
                index,
                delta,
                "item above viewport resized, adjusting scroll"
            );
            self.scroll_offset = (self.scroll_offset + delta).max(0.0);
            delta
        } else {
            0.0
        }
    }

    /// Sum of all item sizes plus padding.
    pub fn total_size(&mut self) -> f64 {
        self.ensure_layout();
        self.starts[self.options.count] + self.options.padding_end
    }

    /// Start offset of an item.
    pub fn start_of(&mut self, index: usize) -> Option<f64> {
        if index >= self.options.count {
            return None;
        }
        self.ensure_layout();
        Some(self.starts[index])
    }

    /// Visible and rendered index ranges for the current scroll position.
    ///
    /// `None` when there are no items.
    pub fn range(&mut self) -> Option<WindowRange> {
        let count = self.options.count;
        if count == 0 {
            return None;
        }
        self.ensure_layout();

        let offset = self.scroll_offset;
        let viewport_end = offset + self.viewport_size;

        // First item whose end lies past the scroll offset.
        let first_visible = self.starts[1..=count]
            .partition_point(|&end| end <= offset)
            .min(count - 1);
        // Last item starting before the viewport ends.
        let last_visible = self.starts[..count]
            .partition_point(|&start| start < viewport_end)
            .saturating_sub(1)
            .max(first_visible);

        let overscan = self.options.overscan;
        Some(WindowRange {
            first_visible,
            last_visible,
            start: first_visible.saturating_sub(overscan),
            end: (last_visible + overscan).min(count - 1),
        })
    }

    /// Items to render right now, in index order.
    pub fn virtual_items(&mut self) -> Vec<VirtualItem> {
        let Some(range) = self.range() else {
            return Vec::new();
        };
        let items: Vec<_> = (range.start..=range.end)
            .map(|index| {
                let start = self.starts[index];
                let size = self.size_of(index);
                VirtualItem {
                    index,
                    start,
                    end: start + size,
                    size,
                    key: make_block_id(index),
                }
            })
            .collect();

        tracing::trace!(
            target: "vellum::window",
            start = range.start,
            end = range.end,
            scroll_offset = self.scroll_offset,
            "computed window"
        );
        items
    }

    /// The render plan: everything when disabled, the window otherwise.
    pub fn plan(&mut self) -> RenderPlan {
        if !self.options.enabled {
            return RenderPlan::Full {
                count: self.options.count,
            };
        }
        RenderPlan::Windowed {
            items: self.virtual_items(),
            total_size: self.total_size(),
        }
    }

    /// Scroll offset that brings `index` into view with the given alignment.
    pub fn offset_for_index(&mut self, index: usize, align: Align) -> Option<f64> {
        let count = self.options.count;
        if count == 0 {
            return None;
        }
        let index = index.min(count - 1);
        self.ensure_layout();

        let start = self.starts[index];
        let size = self.size_of(index);
        let viewport = self.viewport_size;
        let target = match align {
            Align::Start => start,
            Align::End => start + size - viewport,
            Align::Center => start + size / 2.0 - viewport / 2.0,
            Align::Auto => {
                if start < self.scroll_offset {
                    start
                } else if start + size > self.scroll_offset + viewport {
                    start + size - viewport
                } else {
                    self.scroll_offset
                }
            }
        };

        let max_offset = (self.total_size() - viewport).max(0.0);
        Some(target.clamp(0.0, max_offset))
    }

    /// Whether every item in the current window has a real measurement.
    pub fn is_converged(&mut self) -> bool {
        match self.range() {
            Some(range) => (range.start..=range.end).all(|i| self.measured.contains_key(&i)),
            None => true,
        }
    }

    fn mark_stale(&mut self, from: usize) {
        self.stale_from = Some(self.stale_from.map_or(from, |current| current.min(from)));
    }

    fn ensure_layout(&mut self) {
        let Some(from) = self.stale_from.take() else {
            return;
        };
        let count = self.options.count;
        self.starts.resize(count + 1, 0.0);
        if from == 0 {
            self.starts[0] = self.options.padding_start;
        }
        for i in from.max(1)..=count {
            self.starts[i] = self.starts[i - 1] + self.size_of(i - 1);
        }
    }
}
