// MIDI event types
// The closed set of events the engine schedules, and their 1-3 byte wire form

use std::fmt;

/// Track index given to events injected from MIDI-IN
pub const LIVE_TRACK: u16 = u16::MAX;

/// Number of data bytes following a channel status byte (0x80..=0xEF)
pub fn channel_data_len(status: u8) -> Option<usize> {
    match status & 0xF0 {
        0xC0 | 0xD0 => Some(1),
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => Some(2),
        _ => None,
    }
}

/// What an event does once it reaches the synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8, velocity: u8 },
    ProgramChange { program: u8 },
    ControlChange { controller: u8, value: u8 },
    TempoChange { micros_per_quarter: u32 },
    EndOfTrack,
}

/// A MIDI event positioned on the score timeline
///
/// `tick` is absolute. `track` is the SMF track the event was decoded
/// from, `LIVE_TRACK` for MIDI-IN, or the grid lane for sequencer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub tick: u64,
    pub channel: u8,
    pub track: u16,
    pub kind: EventKind,
}

impl MidiEvent {
    pub fn new(tick: u64, channel: u8, kind: EventKind) -> Self {
        Self {
            tick,
            channel: channel & 0x0F,
            track: 0,
            kind,
        }
    }

    pub fn note_on(tick: u64, channel: u8, key: u8, velocity: u8) -> Self {
        Self::new(tick, channel, EventKind::NoteOn { key, velocity })
    }

    pub fn note_off(tick: u64, channel: u8, key: u8) -> Self {
        Self::new(tick, channel, EventKind::NoteOff { key, velocity: 0 })
    }

    pub fn program_change(tick: u64, channel: u8, program: u8) -> Self {
        Self::new(tick, channel, EventKind::ProgramChange { program })
    }

    pub fn control_change(tick: u64, channel: u8, controller: u8, value: u8) -> Self {
        Self::new(tick, channel, EventKind::ControlChange { controller, value })
    }

    pub fn with_track(mut self, track: u16) -> Self {
        self.track = track;
        self
    }

    /// First data byte as it would appear on the wire
    pub fn data1(&self) -> u8 {
        match self.kind {
            EventKind::NoteOn { key, .. } | EventKind::NoteOff { key, .. } => key,
            EventKind::ProgramChange { program } => program,
            EventKind::ControlChange { controller, .. } => controller,
            EventKind::TempoChange { .. } | EventKind::EndOfTrack => 0,
        }
    }

    /// Second data byte as it would appear on the wire
    pub fn data2(&self) -> u8 {
        match self.kind {
            EventKind::NoteOn { velocity, .. } | EventKind::NoteOff { velocity, .. } => velocity,
            EventKind::ControlChange { value, .. } => value,
            _ => 0,
        }
    }

    /// True for events that reach the synthesizer (everything but meta events)
    pub fn is_channel_message(&self) -> bool {
        !matches!(
            self.kind,
            EventKind::TempoChange { .. } | EventKind::EndOfTrack
        )
    }

    /// Serialize to the 2-3 byte wire format
    pub fn to_wire(&self) -> Option<WireMessage> {
        let channel = self.channel & 0x0F;
        match self.kind {
            EventKind::NoteOn { key, velocity } => {
                WireMessage::new(&[0x90 | channel, key & 0x7F, velocity & 0x7F])
            }
            EventKind::NoteOff { key, velocity } => {
                WireMessage::new(&[0x80 | channel, key & 0x7F, velocity & 0x7F])
            }
            EventKind::ControlChange { controller, value } => {
                WireMessage::new(&[0xB0 | channel, controller & 0x7F, value & 0x7F])
            }
            EventKind::ProgramChange { program } => {
                WireMessage::new(&[0xC0 | channel, program & 0x7F])
            }
            EventKind::TempoChange { .. } | EventKind::EndOfTrack => None,
        }
    }

    /// Parse one complete wire message received on MIDI-IN
    ///
    /// NoteOn with velocity 0 is normalized to NoteOff. Channel messages the
    /// engine does not schedule (pressure, pitch bend) and system messages
    /// yield `None`.
    pub fn from_wire(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let needed = channel_data_len(status)?;
        if bytes.len() < needed + 1 || bytes[1..=needed].iter().any(|b| b & 0x80 != 0) {
            return None;
        }

        let channel = status & 0x0F;
        let kind = match status & 0xF0 {
            0x90 if bytes[2] == 0 => EventKind::NoteOff {
                key: bytes[1],
                velocity: 0,
            },
            0x90 => EventKind::NoteOn {
                key: bytes[1],
                velocity: bytes[2],
            },
            0x80 => EventKind::NoteOff {
                key: bytes[1],
                velocity: bytes[2],
            },
            0xB0 => EventKind::ControlChange {
                controller: bytes[1],
                value: bytes[2],
            },
            0xC0 => EventKind::ProgramChange { program: bytes[1] },
            _ => return None,
        };

        Some(Self::new(0, channel, kind).with_track(LIVE_TRACK))
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::NoteOn { key, velocity } => write!(
                f,
                "@{} ch{} NoteOn {} vel {}",
                self.tick,
                self.channel + 1,
                key,
                velocity
            ),
            EventKind::NoteOff { key, .. } => {
                write!(f, "@{} ch{} NoteOff {}", self.tick, self.channel + 1, key)
            }
            EventKind::ProgramChange { program } => {
                write!(f, "@{} ch{} Program {}", self.tick, self.channel + 1, program)
            }
            EventKind::ControlChange { controller, value } => write!(
                f,
                "@{} ch{} CC{} = {}",
                self.tick,
                self.channel + 1,
                controller,
                value
            ),
            EventKind::TempoChange { micros_per_quarter } => {
                write!(f, "@{} Tempo {} us/qn", self.tick, micros_per_quarter)
            }
            EventKind::EndOfTrack => write!(f, "@{} EndOfTrack", self.tick),
        }
    }
}

/// A single 1-3 byte MIDI message as sent over the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireMessage {
    bytes: [u8; 3],
    len: u8,
}

impl WireMessage {
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 3 {
            return None;
        }
        let mut buf = [0u8; 3];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
