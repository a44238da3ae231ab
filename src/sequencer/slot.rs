// Slot representation for the step sequencer
// One note cell at a (bar, step, track) coordinate

use crate::sequencer::grid::GridError;
use serde::{Deserialize, Serialize};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A filled grid cell
///
/// Empty cells are `None` in the grid. Gate length is in the grid's own
/// ticks-per-quarter resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerSlot {
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// MIDI velocity (0-127); 0 keeps the slot but never sounds it
    pub velocity: u8,

    /// How long the note is held, in ticks
    pub gate_ticks: u32,

    /// Output channel (0-15)
    pub channel: u8,
}

impl SequencerSlot {
    pub fn new(pitch: u8, velocity: u8, gate_ticks: u32, channel: u8) -> Self {
        Self {
            pitch,
            velocity,
            gate_ticks,
            channel,
        }
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.pitch > 127 {
            return Err(GridError::InvalidSlot(format!(
                "pitch {} exceeds MIDI range (0-127)",
                self.pitch
            )));
        }
        if self.velocity > 127 {
            return Err(GridError::InvalidSlot(format!(
                "velocity {} exceeds MIDI range (0-127)",
                self.velocity
            )));
        }
        if self.gate_ticks == 0 {
            return Err(GridError::InvalidSlot("gate length cannot be 0".to_string()));
        }
        if self.channel > 15 {
            return Err(GridError::InvalidChannel(self.channel));
        }
        Ok(())
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        let octave = (self.pitch / 12) as i32 - 1;
        let note_index = (self.pitch % 12) as usize;

        format!("{}{}", NOTE_NAMES[note_index], octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_validation() {
        assert!(SequencerSlot::new(60, 100, 240, 0).validate().is_ok());
        assert!(SequencerSlot::new(128, 100, 240, 0).validate().is_err());
        assert!(SequencerSlot::new(60, 128, 240, 0).validate().is_err());
        assert!(SequencerSlot::new(60, 100, 0, 0).validate().is_err());
        assert!(matches!(
            SequencerSlot::new(60, 100, 240, 16).validate(),
            Err(GridError::InvalidChannel(16))
        ));
    }

    #[test]
    fn test_note_name() {
        assert_eq!(SequencerSlot::new(60, 100, 1, 0).note_name(), "C4");
        assert_eq!(SequencerSlot::new(69, 100, 1, 0).note_name(), "A4");
        assert_eq!(SequencerSlot::new(73, 100, 1, 0).note_name(), "C#5");
        assert_eq!(SequencerSlot::new(0, 100, 1, 0).note_name(), "C-1");
    }
}
