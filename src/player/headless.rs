use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::trace;

use super::traits::{MediaElement, MediaSignal, SignalSink};
use super::types::ReadinessLevel;
use crate::models::MediaSource;

#[derive(Debug, Default)]
struct HeadlessState {
    attached: Vec<MediaSource>,
    attach_count: usize,
    play_calls: usize,
    first_play_muted: Option<bool>,
    rejections_left: usize,
    playing: bool,
    muted: bool,
    released: bool,
}

/// Read access to what a [`HeadlessElement`] went through.
#[derive(Debug, Clone)]
pub struct ElementMonitor {
    state: Arc<Mutex<HeadlessState>>,
}

impl ElementMonitor {
    fn with<T>(&self, f: impl FnOnce(&HeadlessState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    pub fn attached(&self) -> Vec<MediaSource> {
        self.with(|s| s.attached.clone())
    }

    pub fn attach_count(&self) -> usize {
        self.with(|s| s.attach_count)
    }

    pub fn play_calls(&self) -> usize {
        self.with(|s| s.play_calls)
    }

    pub fn is_playing(&self) -> bool {
        self.with(|s| s.playing)
    }

    pub fn is_muted(&self) -> bool {
        self.with(|s| s.muted)
    }

    pub fn released(&self) -> bool {
        self.with(|s| s.released)
    }

    pub fn was_muted_at_first_play(&self) -> bool {
        self.with(|s| s.first_play_muted.unwrap_or(false))
    }
}

/// Media element without a decoder.
///
/// Attaching reports readiness straight away up to the configured level, and
/// play is accepted unless rejections were queued with [`Self::rejecting`].
#[derive(Debug)]
pub struct HeadlessElement {
    readiness: ReadinessLevel,
    state: Arc<Mutex<HeadlessState>>,
    signals: Option<SignalSink>,
}

impl HeadlessElement {
    pub fn new(readiness: ReadinessLevel) -> Self {
        Self {
            readiness,
            state: Arc::new(Mutex::new(HeadlessState {
                muted: true,
                ..Default::default()
            })),
            signals: None,
        }
    }

    /// Reject the next `count` play requests.
    pub fn rejecting(self, count: usize) -> Self {
        self.update(|s| s.rejections_left = count);
        self
    }

    pub fn monitor(&self) -> ElementMonitor {
        ElementMonitor {
            state: self.state.clone(),
        }
    }

    fn update<T>(&self, f: impl FnOnce(&mut HeadlessState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl MediaElement for HeadlessElement {
    fn attach(&mut self, sources: &[MediaSource], signals: SignalSink) {
        self.update(|s| {
            s.attached = sources.to_vec();
            s.attach_count += 1;
            s.playing = false;
            s.released = false;
        });

        if sources.is_empty() {
            signals.emit(MediaSignal::Exhausted);
        } else {
            for level in [
                ReadinessLevel::Metadata,
                ReadinessLevel::FirstFrame,
                ReadinessLevel::CanPlay,
            ] {
                if level > self.readiness {
                    break;
                }
                signals.emit(MediaSignal::Ready(level));
            }
        }
        trace!("Headless element attached {} source(s)", sources.len());
        self.signals = Some(signals);
    }

    async fn play(&mut self) -> Result<()> {
        let accepted = self.update(|s| {
            s.play_calls += 1;
            s.first_play_muted.get_or_insert(s.muted);
            if s.rejections_left > 0 {
                s.rejections_left -= 1;
                false
            } else {
                s.playing = !s.attached.is_empty();
                s.playing
            }
        });

        if accepted {
            Ok(())
        } else {
            Err(anyhow!("play() request was rejected"))
        }
    }

    fn pause(&mut self) {
        self.update(|s| s.playing = false);
    }

    fn set_muted(&mut self, muted: bool) {
        self.update(|s| s.muted = muted);
    }

    fn is_muted(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.muted,
            Err(poisoned) => poisoned.into_inner().muted,
        }
    }

    fn release(&mut self) {
        self.update(|s| {
            s.attached.clear();
            s.playing = false;
            s.released = true;
        });
        self.signals = None;
    }
}
