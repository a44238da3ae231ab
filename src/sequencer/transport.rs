// Transport - Playback mode and cursor
// The session owns the cursor; other threads read it through SharedPlaybackState

use super::repeat::ActiveRepeat;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Playback mode (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackMode {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackMode::Playing)
    }

    /// Stopped or paused
    pub fn is_idle(&self) -> bool {
        !self.is_playing()
    }

    fn as_u8(self) -> u8 {
        match self {
            PlaybackMode::Stopped => 0,
            PlaybackMode::Playing => 1,
            PlaybackMode::Paused => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackMode::Playing,
            2 => PlaybackMode::Paused,
            _ => PlaybackMode::Stopped,
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackMode::Stopped => "stopped",
            PlaybackMode::Playing => "playing",
            PlaybackMode::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Where playback is in the score
///
/// `current_tick` is score time, so it moves backward when a repeat jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackCursor {
    pub mode: PlaybackMode,
    pub current_tick: u64,
    pub current_bar: usize,
    pub active_repeat: Option<ActiveRepeat>,
}

impl fmt::Display for PlaybackCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bar {} tick {}",
            self.mode,
            self.current_bar + 1,
            self.current_tick
        )?;
        if let Some(repeat) = self.active_repeat {
            write!(f, " ({} repeats left)", repeat.remaining)?;
        }
        Ok(())
    }
}

/// Lock-free snapshot of the cursor for display threads
#[derive(Debug, Default)]
pub struct SharedPlaybackState {
    mode: AtomicU8,
    tick: AtomicU64,
    bar: AtomicU64,
}

impl SharedPlaybackState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, cursor: &PlaybackCursor) {
        self.tick.store(cursor.current_tick, Ordering::Relaxed);
        self.bar.store(cursor.current_bar as u64, Ordering::Relaxed);
        self.mode.store(cursor.mode.as_u8(), Ordering::Release);
    }

    pub fn mode(&self) -> PlaybackMode {
        PlaybackMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    pub fn bar(&self) -> usize {
        self.bar.load(Ordering::Relaxed) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_predicates() {
        assert!(PlaybackMode::Playing.is_playing());
        assert!(PlaybackMode::Paused.is_idle());
        assert_eq!(PlaybackMode::default(), PlaybackMode::Stopped);
    }

    #[test]
    fn test_shared_state_publish() {
        let shared = SharedPlaybackState::new();
        let cursor = PlaybackCursor {
            mode: PlaybackMode::Paused,
            current_tick: 2400,
            current_bar: 1,
            active_repeat: None,
        };
        shared.publish(&cursor);

        assert_eq!(shared.mode(), PlaybackMode::Paused);
        assert_eq!(shared.tick(), 2400);
        assert_eq!(shared.bar(), 1);
    }

    #[test]
    fn test_cursor_display() {
        let cursor = PlaybackCursor {
            mode: PlaybackMode::Playing,
            current_tick: 0,
            current_bar: 2,
            active_repeat: Some(ActiveRepeat {
                bar: 1,
                remaining: 2,
            }),
        };
        assert_eq!(cursor.to_string(), "playing bar 3 tick 0 (2 repeats left)");
    }
}
