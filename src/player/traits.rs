use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{DeviceClass, NetworkHint, ReadinessLevel};
use crate::models::MediaSource;

/// Signals the platform raises about the attached media.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    Ready(ReadinessLevel),
    /// Playback actually started (or resumed after buffering).
    Playing,
    /// Playback froze waiting for data.
    Stalled,
    /// A candidate failed and the platform is moving on to the next one.
    SourceFailed { remaining: usize },
    /// No candidate is left.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct SignalEnvelope {
    pub generation: u64,
    pub signal: MediaSignal,
}

/// Sender handed to a media element on attach.
///
/// Every attach gets a new generation so the slot can drop signals that were
/// raised for a source it has since replaced or released.
#[derive(Debug, Clone)]
pub struct SignalSink {
    generation: u64,
    sender: mpsc::UnboundedSender<SignalEnvelope>,
}

impl SignalSink {
    pub fn new(generation: u64, sender: mpsc::UnboundedSender<SignalEnvelope>) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the owning slot is gone.
    pub fn emit(&self, signal: MediaSignal) -> bool {
        self.sender
            .send(SignalEnvelope {
                generation: self.generation,
                signal,
            })
            .is_ok()
    }
}

/// The platform media element owned by exactly one slot.
#[async_trait]
pub trait MediaElement: Send {
    /// Replace the source list and start fetching.
    fn attach(&mut self, sources: &[MediaSource], signals: SignalSink);
    /// Resolves once the platform accepted the request; an error is a rejection.
    async fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
    /// Detach the sources and abandon any fetch in flight. Safe to repeat.
    fn release(&mut self);
}

/// Creates the media element for a feed position.
pub trait MediaElementFactory: Send + Sync {
    fn create(&self, index: usize) -> Box<dyn MediaElement>;
}

impl<F> MediaElementFactory for F
where
    F: Fn(usize) -> Box<dyn MediaElement> + Send + Sync,
{
    fn create(&self, index: usize) -> Box<dyn MediaElement> {
        self(index)
    }
}

/// Device and network facts the resolver and the state machine depend on.
pub trait EnvironmentProbe: Send + Sync + std::fmt::Debug {
    fn device_class(&self) -> DeviceClass;
    fn network_hint(&self) -> NetworkHint;
    /// Whether an adaptive-streaming manifest can be played, natively or
    /// through a companion library.
    fn supports_manifest(&self) -> bool;
}
