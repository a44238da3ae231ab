// Output transports - where serialized MIDI goes after dispatch

use crate::messaging::channels::bounded;
use crate::midi::event::WireMessage;
use midir::{MidiOutput as MidirOutput, MidiOutputConnection, MidiOutputPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Output transport is full")]
    Full,

    #[error("Output transport is disconnected")]
    Disconnected,
}

/// Non-blocking sink for wire messages
///
/// Implementations must return immediately; a message that cannot be
/// accepted right now is reported as `Full` and dropped by the caller.
pub trait Transport {
    fn try_send(&mut self, message: WireMessage) -> Result<(), TransportError>;
}

pub type WireProducer = ringbuf::HeapProd<WireMessage>;
pub type WireConsumer = ringbuf::HeapCons<WireMessage>;

/// Bounded queue to a writer thread that owns the real port
pub fn create_output_channel(capacity: usize) -> (WireProducer, WireConsumer) {
    bounded(capacity)
}

impl Transport for WireProducer {
    fn try_send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        ringbuf::traits::Producer::try_push(self, message).map_err(|_| TransportError::Full)
    }
}

/// Collects messages in memory, optionally bounded
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    messages: Vec<WireMessage>,
    capacity: Option<usize>,
    connected: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            capacity: None,
            connected: true,
        }
    }

    /// Refuse messages once `capacity` are held
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    pub fn messages(&self) -> &[WireMessage] {
        &self.messages
    }

    /// Byte form of every message, for assertions
    pub fn bytes(&self) -> Vec<Vec<u8>> {
        self.messages.iter().map(|m| m.as_bytes().to_vec()).collect()
    }

    pub fn take(&mut self) -> Vec<WireMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Transport for MemoryTransport {
    fn try_send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        if self.capacity.is_some_and(|c| self.messages.len() >= c) {
            return Err(TransportError::Full);
        }
        self.messages.push(message);
        Ok(())
    }
}

/// Direct connection to a midir output port
pub struct MidirTransport {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirTransport {
    pub fn connect(midi_out: MidirOutput, port: &MidiOutputPort) -> Result<Self, String> {
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());
        let connection = midi_out
            .connect(port, "unimidi-seq-output")
            .map_err(|e| format!("MIDI output connection failed: {}", e))?;

        tracing::info!("Output connected to {}", port_name);
        Ok(Self {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for MidirTransport {
    fn try_send(&mut self, message: WireMessage) -> Result<(), TransportError> {
        self.connection
            .send(message.as_bytes())
            .map_err(|_| TransportError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Consumer;

    fn note() -> WireMessage {
        WireMessage::new(&[0x90, 60, 100]).unwrap()
    }

    #[test]
    fn test_bounded_memory_transport() {
        let mut transport = MemoryTransport::bounded(1);
        assert!(transport.try_send(note()).is_ok());
        assert_eq!(transport.try_send(note()), Err(TransportError::Full));
        assert_eq!(transport.messages().len(), 1);

        transport.set_connected(false);
        transport.take();
        assert_eq!(transport.try_send(note()), Err(TransportError::Disconnected));
    }

    #[test]
    fn test_ring_transport_reports_full() {
        let (mut tx, mut rx) = create_output_channel(1);
        assert!(tx.try_send(note()).is_ok());
        assert_eq!(tx.try_send(note()), Err(TransportError::Full));
        assert_eq!(rx.try_pop(), Some(note()));
    }
}
