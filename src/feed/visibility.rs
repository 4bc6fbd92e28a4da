use std::collections::BTreeSet;
use tracing::trace;

use super::cursor::FeedCursor;
use crate::config::FeedConfig;
use crate::player::DeviceClass;

/// Slots around the active one that are fetched ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadWindow {
    pub behind: usize,
    pub ahead: usize,
}

impl PreloadWindow {
    pub fn for_device(config: &FeedConfig, device: DeviceClass) -> Self {
        Self {
            behind: config.preload_behind,
            ahead: if device.is_mobile() {
                config.mobile_preload_ahead
            } else {
                config.preload_ahead
            },
        }
    }

    pub fn contains(&self, index: usize, active: usize) -> bool {
        index + self.behind >= active && index <= active + self.ahead
    }

    /// Indices of the window clamped to the feed, active one first.
    pub fn indices(&self, cursor: &FeedCursor) -> Vec<usize> {
        if cursor.length == 0 {
            return Vec::new();
        }
        let active = cursor.active_index;
        let first = active.saturating_sub(self.behind);
        let last = (active + self.ahead).min(cursor.length - 1);

        let mut indices = vec![active];
        indices.extend((first..=last).filter(|&i| i != active));
        indices
    }
}

/// Decides which slots may fetch media.
///
/// Eligibility is sticky: once a slot was let through it stays eligible until
/// the coordinator evicts it, so scrolling back never re-fetches.
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    window: PreloadWindow,
    eviction_margin: usize,
    viewport_margin: f64,
    viewport_height: f64,
    eligible: BTreeSet<usize>,
}

impl VisibilityGate {
    pub fn new(config: &FeedConfig, device: DeviceClass) -> Self {
        Self {
            window: PreloadWindow::for_device(config, device),
            eviction_margin: config.eviction_margin,
            viewport_margin: config.viewport_margin,
            viewport_height: config.viewport_height,
            eligible: BTreeSet::new(),
        }
    }

    pub fn window(&self) -> PreloadWindow {
        self.window
    }

    pub fn set_viewport_height(&mut self, height: f64) {
        if height > 0.0 {
            self.viewport_height = height;
        }
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn should_load(&self, index: usize, cursor: &FeedCursor) -> bool {
        index < cursor.length
            && (self.eligible.contains(&index)
                || index == cursor.active_index
                || self.window.contains(index, cursor.active_index))
    }

    pub fn is_eligible(&self, index: usize) -> bool {
        self.eligible.contains(&index)
    }

    pub fn eligible(&self) -> impl Iterator<Item = usize> + '_ {
        self.eligible.iter().copied()
    }

    /// Whether the slot's top edge is within the margin of the scroll offset.
    pub fn intersects(&self, index: usize, scroll_offset: f64) -> bool {
        let top = FeedCursor::offset_of(index, self.viewport_height);
        (top - scroll_offset).abs() <= self.viewport_margin * self.viewport_height
    }

    /// Newly eligible slots from the active one and its window.
    pub fn admit_window(&mut self, cursor: &FeedCursor) -> Vec<usize> {
        self.window
            .indices(cursor)
            .into_iter()
            .filter(|&index| self.eligible.insert(index))
            .collect()
    }

    /// Newly eligible slots near a raw, undebounced scroll sample.
    pub fn admit_intersecting(&mut self, scroll_offset: f64, length: usize) -> Vec<usize> {
        if length == 0 || self.viewport_height <= 0.0 {
            return Vec::new();
        }
        let reach = self.viewport_margin * self.viewport_height;
        let first = ((scroll_offset - reach) / self.viewport_height).ceil().max(0.0) as usize;
        let last = (((scroll_offset + reach) / self.viewport_height).floor().max(0.0) as usize)
            .min(length - 1);

        let height = self.viewport_height;
        let admitted: Vec<usize> = (first..=last)
            .filter(|&index| {
                (FeedCursor::offset_of(index, height) - scroll_offset).abs() <= reach
                    && self.eligible.insert(index)
            })
            .collect();
        if !admitted.is_empty() {
            trace!("Scroll at {:.0} admitted {:?}", scroll_offset, admitted);
        }
        admitted
    }

    /// Eligible slots too far from the active one. They are forgotten here.
    pub fn take_evictions(&mut self, cursor: &FeedCursor) -> Vec<usize> {
        let low = cursor
            .active_index
            .saturating_sub(self.window.behind + self.eviction_margin);
        let high = cursor.active_index + self.window.ahead + self.eviction_margin;

        let evicted: Vec<usize> = self
            .eligible
            .iter()
            .copied()
            .filter(|&index| index < low || index > high)
            .collect();
        for index in &evicted {
            self.eligible.remove(index);
        }
        evicted
    }

    pub fn forget(&mut self, index: usize) {
        self.eligible.remove(&index);
    }
}
