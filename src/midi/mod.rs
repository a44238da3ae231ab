// MIDI module - events, file decoding, live input and ports

pub mod device;
pub mod event;
pub mod input;
pub mod smf;

pub use event::{EventKind, LIVE_TRACK, MidiEvent, WireMessage};
pub use input::{LiveInputConsumer, LiveInputParser, LiveInputProducer, create_live_input_channel};
pub use smf::{DecodeError, DecodeErrorKind, Smf, decode, encode};
