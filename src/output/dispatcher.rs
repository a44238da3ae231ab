// Output dispatcher - channel settings, note tracking and wire serialization

use crate::midi::event::{EventKind, MidiEvent, WireMessage};
use crate::output::transport::{Transport, TransportError};
use crate::project::types::{CHANNEL_COUNT, ChannelTable};
use crate::sequencer::scheduler::EventSource;
use std::collections::BTreeMap;

const CC_BANK_SELECT: u8 = 0;
pub const CC_REVERB_SEND: u8 = 91;
pub const CC_CHORUS_SEND: u8 = 93;
const CC_ALL_NOTES_OFF: u8 = 123;

pub const MAX_MASTER_VOLUME: u8 = 127;

/// Log the first drop and then every this many
const DROP_LOG_INTERVAL: u64 = 100;

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Messages accepted by the transport
    pub sent: u64,
    /// Messages lost to a full or disconnected transport
    pub dropped: u64,
    /// Events suppressed by a muted channel or a zero scaled velocity
    pub suppressed: u64,
    /// Notes currently sounding
    pub sounding: usize,
}

/// `round(velocity * ratio)` clamped to 0..=127
pub fn scale_velocity(velocity: u8, volume_ratio: f32) -> u8 {
    let ratio = if volume_ratio.is_finite() {
        volume_ratio.clamp(0.0, 1.0)
    } else {
        1.0
    };
    (velocity as f32 * ratio).round().clamp(0.0, 127.0) as u8
}

/// Serializes events for the transport and remembers sounding notes
pub struct Dispatcher<T: Transport> {
    transport: T,
    /// (channel, key) -> who started it
    ///
    /// A retrigger keeps the first source, so a key held on MIDI-IN stays
    /// live even when the score plays the same note.
    sounding: BTreeMap<(u8, u8), EventSource>,
    /// 0-127, scales every NoteOn on top of the channel ratio
    master_volume: u8,
    stats: DispatchStats,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sounding: BTreeMap::new(),
            master_volume: MAX_MASTER_VOLUME,
            stats: DispatchStats::default(),
        }
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: u8) {
        self.master_volume = volume.min(MAX_MASTER_VOLUME);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sounding: self.sounding.len(),
            ..self.stats
        }
    }

    pub fn is_sounding(&self, channel: u8, key: u8) -> bool {
        self.sounding.contains_key(&(channel, key))
    }

    /// Apply channel settings and hand the event to the transport
    ///
    /// Never blocks: a refused message is counted and dropped.
    pub fn dispatch(&mut self, event: &MidiEvent, source: EventSource, channels: &ChannelTable) {
        let channel = event.channel & 0x0F;
        let settings = &channels[channel as usize];
        let mut event = *event;

        match &mut event.kind {
            EventKind::NoteOff { key, .. } => {
                // A note that made it out must always be allowed to end
                if settings.muted && !self.is_sounding(channel, *key) {
                    self.stats.suppressed += 1;
                    return;
                }
            }
            EventKind::NoteOn { velocity, .. } => {
                if settings.muted {
                    self.stats.suppressed += 1;
                    return;
                }
                let master = self.master_volume as f32 / MAX_MASTER_VOLUME as f32;
                *velocity = scale_velocity(*velocity, settings.volume_ratio * master);
                if *velocity == 0 {
                    self.stats.suppressed += 1;
                    return;
                }
            }
            EventKind::TempoChange { .. } | EventKind::EndOfTrack => return,
            _ => {
                if settings.muted {
                    self.stats.suppressed += 1;
                    return;
                }
            }
        }

        let Some(message) = event.to_wire() else {
            return;
        };
        if self.send(message).is_err() {
            return;
        }

        match event.kind {
            EventKind::NoteOn { key, .. } => {
                self.sounding.entry((channel, key)).or_insert(source);
            }
            EventKind::NoteOff { key, .. } => {
                self.sounding.remove(&(channel, key));
            }
            _ => {}
        }
    }

    /// NoteOff for every sounding note started by one of `sources`
    ///
    /// Notes whose NoteOff could not be sent stay tracked for a later retry.
    pub fn release(&mut self, sources: &[EventSource]) -> usize {
        let targets: Vec<(u8, u8)> = self
            .sounding
            .iter()
            .filter(|(_, source)| sources.contains(source))
            .map(|(note, _)| *note)
            .collect();
        self.release_notes(targets)
    }

    /// NoteOff for every sounding note on `channel`
    pub fn release_channel(&mut self, channel: u8) -> usize {
        let targets: Vec<(u8, u8)> = self
            .sounding
            .keys()
            .filter(|(c, _)| *c == channel)
            .copied()
            .collect();
        self.release_notes(targets)
    }

    fn release_notes(&mut self, targets: Vec<(u8, u8)>) -> usize {
        let mut released = 0;
        for (channel, key) in targets {
            let Some(message) = MidiEvent::note_off(0, channel, key).to_wire() else {
                continue;
            };
            if self.send(message).is_ok() {
                self.sounding.remove(&(channel, key));
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!("Released {} notes", released);
        }
        released
    }

    /// Bank select, program change and effect sends for every unmuted channel
    pub fn send_channel_setup(&mut self, channels: &ChannelTable) -> usize {
        let mut sent = 0;
        for (channel, settings) in channels.iter().enumerate() {
            if settings.muted {
                continue;
            }
            let channel = channel as u8;
            let events = [
                MidiEvent::control_change(0, channel, CC_BANK_SELECT, settings.bank),
                MidiEvent::program_change(0, channel, settings.program),
                MidiEvent::control_change(0, channel, CC_REVERB_SEND, settings.reverb),
                MidiEvent::control_change(0, channel, CC_CHORUS_SEND, settings.chorus),
            ];
            for event in events {
                if let Some(message) = event.to_wire()
                    && self.send(message).is_ok()
                {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// CC 123 on all channels
    ///
    /// Notes are forgotten only on channels whose CC 123 went out, so a
    /// refused message leaves them tracked for a later release.
    pub fn all_notes_off(&mut self) -> usize {
        let mut silenced = 0;
        for channel in 0..CHANNEL_COUNT as u8 {
            let Some(message) = MidiEvent::control_change(0, channel, CC_ALL_NOTES_OFF, 0).to_wire()
            else {
                continue;
            };
            if self.send(message).is_ok() {
                self.sounding.retain(|&(c, _), _| c != channel);
                silenced += 1;
            }
        }
        silenced
    }

    fn send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        match self.transport.try_send(message) {
            Ok(()) => {
                self.stats.sent += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.dropped += 1;
                if self.stats.dropped == 1 || self.stats.dropped % DROP_LOG_INTERVAL == 0 {
                    tracing::warn!("{}; {} messages dropped so far", e, self.stats.dropped);
                }
                Err(e)
            }
        }
    }
}
