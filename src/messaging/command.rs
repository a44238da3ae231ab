// Control commands - Abstract input from the editor / encoder front end

use crate::sequencer::grid::ClearScope;
use crate::sequencer::repeat::RepeatMarker;
use crate::sequencer::slot::SequencerSlot;

/// One field of a channel's settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelSetting {
    Program(u8),
    Bank(u8),
    /// 0.0 - 1.0 velocity scale
    VolumeRatio(f32),
    Muted(bool),
    /// Reverb send level, 0-127
    Reverb(u8),
    /// Chorus send level, 0-127
    Chorus(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    /// Bar index
    Seek(usize),
    SetTempo(f64),
    EditSlot {
        bar: usize,
        step: usize,
        track: usize,
        slot: Option<SequencerSlot>,
    },
    AdjustVelocity {
        bar: usize,
        step: usize,
        track: usize,
        delta: i16,
    },
    InsertBar(usize),
    DeleteBar(usize),
    ClearChannel {
        channel: u8,
        scope: ClearScope,
    },
    ClearAll,
    SetRepeatMarker(RepeatMarker),
    ClearRepeatMarkers(usize),
    SetChannelSetting {
        channel: u8,
        setting: ChannelSetting,
    },
    SetStepsPerBar(usize),
    /// Playback speed factor, 0.25 - 4.0
    SetSpeed(f64),
    SetTranspose(i8),
    SetVelocityOffset(i8),
    /// Force live input onto one channel, or pass it through unchanged
    SetLiveChannel(Option<u8>),
    /// 0-127
    SetMasterVolume(u8),
    /// Bar where playback stops, or None to play to the end
    SetEndBar(Option<usize>),
    AllNotesOff,
}

impl Command {
    /// Commands that change the grid and must wait while playing
    pub fn is_grid_edit(&self) -> bool {
        matches!(
            self,
            Command::EditSlot { .. }
                | Command::AdjustVelocity { .. }
                | Command::InsertBar(_)
                | Command::DeleteBar(_)
                | Command::ClearChannel { .. }
                | Command::ClearAll
                | Command::SetRepeatMarker(_)
                | Command::ClearRepeatMarkers(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_edit_classification() {
        assert!(Command::InsertBar(0).is_grid_edit());
        assert!(Command::ClearAll.is_grid_edit());
        assert!(!Command::Play.is_grid_edit());
        assert!(!Command::SetTempo(90.0).is_grid_edit());
        assert!(!Command::SetStepsPerBar(8).is_grid_edit());
        assert!(!Command::SetEndBar(Some(2)).is_grid_edit());
    }
}
