pub mod controller;
pub mod environment;
pub mod headless;
pub mod source_resolver;
pub mod state_machine;
pub mod traits;
pub mod types;
pub mod watch_timer;

pub use controller::{SlotConfig, SlotContext, SlotController, SlotEvent, SlotHandle, SlotSnapshot};
pub use environment::{ClientHints, ConnectionReport, FixedProbe, probe_from_config};
pub use headless::{ElementMonitor, HeadlessElement};
pub use source_resolver::{EnvironmentSnapshot, SourceResolver};
pub use state_machine::LoadStateMachine;
pub use traits::{
    EnvironmentProbe, MediaElement, MediaElementFactory, MediaSignal, SignalEnvelope, SignalSink,
};
pub use types::{DeviceClass, LoadState, NetworkHint, ReadinessLevel, RewardGate};
pub use watch_timer::WatchTimer;
