// Sequencer module
// Step grid, repeat signs, musical time, and the playback scheduler

pub mod grid;
pub mod repeat;
pub mod scheduler;
pub mod slot;
pub mod timeline;
pub mod transport;

pub use grid::{ClearScope, GridError, ResolutionReport, SequencerGrid};
pub use repeat::{GridConsistencyWarning, RepeatKind, RepeatMarker};
pub use scheduler::{EventSink, EventSource, PlaybackOptions, PollOutcome, Scheduler, Timeline};
pub use slot::SequencerSlot;
pub use timeline::{Tempo, TempoMap, TimeSignature};
pub use transport::{PlaybackCursor, PlaybackMode, SharedPlaybackState};
