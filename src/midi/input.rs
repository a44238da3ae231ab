// MIDI Input - Live bytes from the serial/USB side into the session queue

use crate::messaging::channels::bounded;
use crate::midi::event::{WireMessage, channel_data_len};
use midir::{MidiInput as MidirInput, MidiInputConnection, MidiInputPort};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type LiveInputProducer = ringbuf::HeapProd<WireMessage>;
pub type LiveInputConsumer = ringbuf::HeapCons<WireMessage>;

/// Bounded queue from the input callback to the poll loop
pub fn create_live_input_channel(capacity: usize) -> (LiveInputProducer, LiveInputConsumer) {
    bounded(capacity)
}

/// Reassembles wire messages from a raw MIDI byte stream
///
/// Handles bytes split across reads and running status. Realtime bytes
/// (0xF8-0xFF) may appear anywhere and are ignored without disturbing the
/// message in progress. SysEx and system common messages are skipped.
#[derive(Debug, Default)]
pub struct LiveInputParser {
    running_status: Option<u8>,
    buffer: [u8; 3],
    len: usize,
    needed: usize,
    in_sysex: bool,
    dropped: Arc<AtomicU64>,
}

impl LiveInputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages lost to a full queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Shared handle on the drop counter
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    /// Feed raw bytes, calling `sink` for each complete message
    pub fn parse(&mut self, bytes: &[u8], mut sink: impl FnMut(WireMessage)) {
        for &byte in bytes {
            if byte >= 0xF8 {
                continue;
            }

            if byte & 0x80 != 0 {
                self.len = 0;
                if byte == 0xF0 {
                    self.in_sysex = true;
                    self.running_status = None;
                    continue;
                }
                self.in_sysex = false;
                match channel_data_len(byte) {
                    Some(needed) => {
                        self.running_status = Some(byte);
                        self.buffer[0] = byte;
                        self.len = 1;
                        self.needed = needed;
                    }
                    // F1-F7: system common cancels running status
                    None => self.running_status = None,
                }
                continue;
            }

            if self.in_sysex {
                continue;
            }

            if self.len == 0 {
                let Some(status) = self.running_status else {
                    continue;
                };
                self.buffer[0] = status;
                self.len = 1;
                self.needed = channel_data_len(status).unwrap_or(0);
            }

            self.buffer[self.len] = byte;
            self.len += 1;
            if self.len == self.needed + 1 {
                if let Some(message) = WireMessage::new(&self.buffer[..self.len]) {
                    sink(message);
                }
                self.len = 0;
            }
        }
    }

    /// Feed raw bytes straight into the live queue, counting overflow
    pub fn push_bytes(&mut self, bytes: &[u8], queue: &mut LiveInputProducer) {
        let dropped = Arc::clone(&self.dropped);
        self.parse(bytes, |message| {
            if ringbuf::traits::Producer::try_push(queue, message).is_err() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}

/// Open MIDI input port feeding the live queue
pub struct MidiInputSource {
    _connection: MidiInputConnection<()>,
    port_name: String,
    dropped: Arc<AtomicU64>,
}

impl MidiInputSource {
    pub fn connect(
        midi_in: MidirInput,
        port: &MidiInputPort,
        mut queue: LiveInputProducer,
    ) -> Result<Self, String> {
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let mut parser = LiveInputParser::new();
        let dropped = parser.dropped_counter();

        // Callback runs on midir's own thread
        let connection = midi_in
            .connect(
                port,
                "unimidi-seq-input",
                move |_timestamp, message, _| parser.push_bytes(message, &mut queue),
                (),
            )
            .map_err(|e| format!("MIDI input connection failed: {}", e))?;

        tracing::info!("Live input connected to {}", port_name);
        Ok(Self {
            _connection: connection,
            port_name,
            dropped,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
