//! Virtual scroll windowing over the visible node sequence
//!
//! Rows default to a fixed height and can be overridden per key. Cumulative
//! top offsets are rebuilt whenever the sequence or a height changes; window
//! lookups are linear scans over them.

use derive_more::Display;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tree_model::NodeKey;

use crate::config::VirtualScrollConfig;

const DEFAULT_ITEM_HEIGHT: f64 = 32.0;

/// Where a row should end up when scrolled into view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrollAlign {
    #[default]
    #[display(fmt = "start")]
    Start,
    #[display(fmt = "center")]
    Center,
    #[display(fmt = "end")]
    End,
}

/// The contiguous range of rows to render for the current scroll offset
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualWindow {
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    /// Top of the first rendered row
    pub offset_y: f64,
    pub total_height: f64,
    pub scroll_top: f64,
    pub container_height: f64,
    pub item_count: usize,
}

impl VirtualWindow {
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Row indices to render; empty when there are no rows.
    pub fn range(&self) -> Option<RangeInclusive<usize>> {
        (!self.is_empty()).then(|| self.start_index..=self.end_index)
    }
}

#[derive(Debug, Clone)]
pub struct VirtualScroller {
    keys: Vec<NodeKey>,
    positions: HashMap<NodeKey, usize>,
    /// Per-key overrides of `item_height`
    heights: HashMap<NodeKey, f64>,
    /// Cumulative top offset of each row
    tops: Vec<f64>,
    total_height: f64,
    scroll_top: f64,
    item_height: f64,
    overscan: usize,
    container_height: f64,
}

impl Default for VirtualScroller {
    fn default() -> Self {
        Self::new(&VirtualScrollConfig::default())
    }
}

impl VirtualScroller {
    pub fn new(config: &VirtualScrollConfig) -> Self {
        let item_height = if is_valid_height(config.item_height) {
            config.item_height
        } else {
            warn!(
                "Invalid item height {}, falling back to {}",
                config.item_height, DEFAULT_ITEM_HEIGHT
            );
            DEFAULT_ITEM_HEIGHT
        };

        Self {
            keys: Vec::new(),
            positions: HashMap::new(),
            heights: HashMap::new(),
            tops: Vec::new(),
            total_height: 0.0,
            scroll_top: 0.0,
            item_height,
            overscan: config.overscan,
            container_height: config.container_height.max(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn total_height(&self) -> f64 {
        self.total_height
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn container_height(&self) -> f64 {
        self.container_height
    }

    /// Replace the row sequence. The scroll offset is re-clamped.
    pub fn set_items<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = NodeKey>,
    {
        self.keys = keys.into_iter().collect();
        self.positions = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), i))
            .collect();
        self.rebuild();
    }

    /// Height of the row for `key`, override or default
    pub fn height_of(&self, key: &NodeKey) -> f64 {
        self.heights.get(key).copied().unwrap_or(self.item_height)
    }

    /// Override (or with `None`, reset) the height of one row.
    ///
    /// Returns false for heights that are not finite and positive.
    pub fn set_item_height(&mut self, key: &NodeKey, height: Option<f64>) -> bool {
        match height {
            Some(h) if !is_valid_height(h) => {
                debug!("Ignoring invalid height {} for {}", h, key);
                return false;
            }
            Some(h) => {
                if self.heights.insert(key.clone(), h) == Some(h) {
                    return false;
                }
            }
            None => {
                if self.heights.remove(key).is_none() {
                    return false;
                }
            }
        }
        self.rebuild();
        true
    }

    /// Drop the overrides of rows whose nodes are gone. Offsets are
    /// recomputed by the next [`Self::set_items`].
    pub fn forget_item_heights(&mut self, keys: &[NodeKey]) {
        for key in keys {
            self.heights.remove(key);
        }
    }

    /// Drop every height override.
    pub fn clear_item_heights(&mut self) {
        self.heights.clear();
    }

    pub fn set_container_height(&mut self, height: f64) -> bool {
        let height = height.max(0.0);
        if height == self.container_height {
            return false;
        }
        self.container_height = height;
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
        true
    }

    fn rebuild(&mut self) {
        self.tops.clear();
        let mut top = 0.0;
        for key in &self.keys {
            self.tops.push(top);
            top += self.height_of(key);
        }
        self.total_height = top;
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }

    /// Cumulative top offset of the row for `key`
    pub fn offset_of(&self, key: &NodeKey) -> Option<f64> {
        self.positions.get(key).map(|&i| self.tops[i])
    }

    pub fn max_scroll(&self) -> f64 {
        (self.total_height - self.container_height).max(0.0)
    }

    /// Move the viewport. The offset is clamped to `[0, max_scroll]`.
    pub fn update(&mut self, scroll_top: f64) -> VirtualWindow {
        let scroll_top = if scroll_top.is_finite() { scroll_top } else { 0.0 };
        self.scroll_top = scroll_top.clamp(0.0, self.max_scroll());
        self.window()
    }

    /// Row containing the vertical offset `y`, clamped to the last row
    fn row_at(&self, y: f64) -> usize {
        let mut row = 0;
        for (i, &top) in self.tops.iter().enumerate() {
            if top > y {
                break;
            }
            row = i;
        }
        row
    }

    /// The window for the current scroll offset, with overscan.
    pub fn window(&self) -> VirtualWindow {
        if self.keys.is_empty() {
            return self.empty_window();
        }

        let first = self.row_at(self.scroll_top);
        // A row starting exactly at the viewport bottom is not visible
        let bottom = self.scroll_top + self.container_height;
        let last = self
            .tops
            .iter()
            .rposition(|&top| top < bottom)
            .unwrap_or(first)
            .max(first);

        let start_index = first.saturating_sub(self.overscan);
        let end_index = (last + self.overscan).min(self.keys.len() - 1);

        VirtualWindow {
            start_index,
            end_index,
            offset_y: self.tops[start_index],
            total_height: self.total_height,
            scroll_top: self.scroll_top,
            container_height: self.container_height,
            item_count: self.keys.len(),
        }
    }

    /// A window spanning every row, used when windowing is switched off.
    pub fn full_window(&self) -> VirtualWindow {
        if self.keys.is_empty() {
            return self.empty_window();
        }
        VirtualWindow {
            start_index: 0,
            end_index: self.keys.len() - 1,
            offset_y: 0.0,
            total_height: self.total_height,
            scroll_top: self.scroll_top,
            container_height: self.container_height,
            item_count: self.keys.len(),
        }
    }

    fn empty_window(&self) -> VirtualWindow {
        VirtualWindow {
            container_height: self.container_height,
            ..VirtualWindow::default()
        }
    }

    /// Scroll offset that brings `key` into view with `align`, clamped.
    pub fn scroll_target(&self, key: &NodeKey, align: ScrollAlign) -> Option<f64> {
        let offset = self.offset_of(key)?;
        let target = match align {
            ScrollAlign::Start => offset,
            ScrollAlign::Center => offset - self.container_height / 2.0,
            ScrollAlign::End => offset - self.container_height + self.height_of(key),
        };
        Some(target.clamp(0.0, self.max_scroll()))
    }

    /// Scroll so that `key` is aligned as requested. `None` if the key is
    /// not in the sequence.
    pub fn scroll_to_node(&mut self, key: &NodeKey, align: ScrollAlign) -> Option<VirtualWindow> {
        let target = self.scroll_target(key, align)?;
        Some(self.update(target))
    }
}

fn is_valid_height(height: f64) -> bool {
    height.is_finite() && height > 0.0
}
