/// Where the user is in the feed. Only the coordinator writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedCursor {
    pub active_index: usize,
    pub length: usize,
}

impl FeedCursor {
    pub fn new(length: usize) -> Self {
        Self {
            active_index: 0,
            length,
        }
    }

    /// The slot that fills most of the viewport at `scroll_top`.
    pub fn active_index_for(scroll_top: f64, viewport_height: f64, length: usize) -> usize {
        if length == 0 || viewport_height <= 0.0 || !scroll_top.is_finite() {
            return 0;
        }
        let index = (scroll_top.max(0.0) / viewport_height).round() as usize;
        index.min(length - 1)
    }

    pub fn offset_of(index: usize, viewport_height: f64) -> f64 {
        index as f64 * viewport_height
    }

    /// Returns whether the active index moved.
    pub fn set_active(&mut self, index: usize) -> bool {
        let index = index.min(self.length.saturating_sub(1));
        let changed = index != self.active_index;
        self.active_index = index;
        changed
    }

    /// Index `delta` slots away, clamped to the feed.
    pub fn step(&self, delta: isize) -> usize {
        let target = self.active_index as isize + delta;
        target.clamp(0, self.length.saturating_sub(1) as isize) as usize
    }

    pub fn extend(&mut self, added: usize) {
        self.length += added;
    }

    /// Within `threshold` slots of the end.
    pub fn is_near_end(&self, threshold: usize) -> bool {
        self.active_index + threshold >= self.length
    }
}
