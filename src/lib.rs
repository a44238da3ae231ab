// unimidi-seq - Library exports for the binary, tests and benchmarks

pub mod config;
pub mod messaging;
pub mod midi;
pub mod output;
pub mod project;
pub mod sequencer;
pub mod session;

// Re-export commonly used types for convenience
pub use config::{ConfigError, EngineConfig};
pub use messaging::{
    ChannelSetting, Command, Notification, NotificationCategory, NotificationLevel,
    create_command_channel, create_notification_channel,
};
pub use midi::{DecodeError, DecodeErrorKind, EventKind, MidiEvent, Smf, WireMessage};
pub use output::{DispatchStats, Dispatcher, MemoryTransport, Transport, TransportError};
pub use project::{Project, ProjectError, ProjectManager};
pub use sequencer::{
    PlaybackMode, PollOutcome, RepeatKind, RepeatMarker, Scheduler, SequencerGrid, SequencerSlot,
    Tempo, TimeSignature,
};
pub use session::{CommandOutcome, Session, SessionError, SessionHandles};
