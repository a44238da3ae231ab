// Timeline - Musical time representation
// Handles conversion between ticks, bars, and wall-clock microseconds

use crate::midi::event::{EventKind, MidiEvent};
use std::fmt;

/// Microseconds per quarter note when a file carries no tempo (120 BPM)
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Speed factor that leaves deadlines untouched
pub const NORMAL_SPEED_PERMILLE: u32 = 1000;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two(),
            "Time signature denominator must be power of 2"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Common 3/4 time signature (waltz)
    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// Common 6/8 time signature
    pub fn six_eight() -> Self {
        Self::new(6, 8)
    }

    pub fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator.is_power_of_two() && self.denominator <= 64
    }

    /// Length of one bar at the given resolution
    /// Example: 4/4 at 480 tpq = 1920 ticks, 6/8 at 480 tpq = 1440 ticks
    pub fn ticks_per_bar(&self, ticks_per_quarter: u32) -> u64 {
        let quarter_ticks = ticks_per_quarter as u64 * 4;
        quarter_ticks * self.numerator as u64 / self.denominator.max(1) as u64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo
    /// BPM must be in range [20.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        assert!(
            (Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm),
            "BPM must be between 20 and 999"
        );
        Self { bpm }
    }

    /// Tempo for a user-supplied value, `None` when out of range
    pub fn checked(bpm: f64) -> Option<Self> {
        (Self::MIN_BPM..=Self::MAX_BPM)
            .contains(&bpm)
            .then_some(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// `60_000_000 / bpm`, rounded to the nearest microsecond
    pub fn micros_per_quarter(&self) -> u32 {
        (60_000_000.0 / self.bpm).round() as u32
    }

    /// Inverse of `micros_per_quarter`, used to display file tempos
    pub fn from_micros_per_quarter(micros_per_quarter: u32) -> Option<Self> {
        if micros_per_quarter == 0 {
            return None;
        }
        Self::checked(60_000_000.0 / micros_per_quarter as f64)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Wall-clock length of `ticks`
///
/// `speed_permille` scales playback speed (1000 = as written). Integer
/// arithmetic keeps deadlines exact: 480 ticks at 500_000 us/qn and 480 tpq
/// is exactly 500_000 us.
pub fn ticks_to_micros(
    ticks: u64,
    micros_per_quarter: u32,
    ticks_per_quarter: u32,
    speed_permille: u32,
) -> u64 {
    let numerator = ticks as u128 * micros_per_quarter as u128 * NORMAL_SPEED_PERMILLE as u128;
    let denominator = ticks_per_quarter.max(1) as u128 * speed_permille.max(1) as u128;
    (numerator / denominator) as u64
}

/// One entry of a tempo map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoEntry {
    pub tick: u64,
    pub micros_per_quarter: u32,
}

/// Ordered (tick, us-per-quarter) pairs, ticks strictly increasing,
/// always starting at tick 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoMap {
    entries: Vec<TempoEntry>,
}

impl TempoMap {
    /// Map with a single tempo for the whole timeline
    pub fn constant(micros_per_quarter: u32) -> Self {
        Self {
            entries: vec![TempoEntry {
                tick: 0,
                micros_per_quarter,
            }],
        }
    }

    /// Build from a tick-ordered event sequence
    /// Later tempo changes on the same tick replace earlier ones
    pub fn from_events(events: &[MidiEvent]) -> Self {
        let mut entries: Vec<TempoEntry> = Vec::new();

        for event in events {
            let EventKind::TempoChange { micros_per_quarter } = event.kind else {
                continue;
            };
            let entry = TempoEntry {
                tick: event.tick,
                micros_per_quarter,
            };
            match entries.last_mut() {
                Some(last) if last.tick == event.tick => *last = entry,
                _ => entries.push(entry),
            }
        }

        if entries.first().is_none_or(|first| first.tick != 0) {
            entries.insert(
                0,
                TempoEntry {
                    tick: 0,
                    micros_per_quarter: DEFAULT_MICROS_PER_QUARTER,
                },
            );
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[TempoEntry] {
        &self.entries
    }

    /// Tempo in force at `tick`
    pub fn micros_per_quarter_at(&self, tick: u64) -> u32 {
        let index = self.entries.partition_point(|entry| entry.tick <= tick);
        self.entries
            .get(index.saturating_sub(1))
            .map(|entry| entry.micros_per_quarter)
            .unwrap_or(DEFAULT_MICROS_PER_QUARTER)
    }

    /// Wall-clock time between two ticks, integrating over tempo changes
    pub fn micros_between(&self, from: u64, to: u64, ticks_per_quarter: u32) -> u64 {
        if to <= from {
            return 0;
        }

        let mut total = 0;
        let mut position = from;
        let mut tempo = self.micros_per_quarter_at(from);

        for entry in self.entries.iter().filter(|e| e.tick > from && e.tick < to) {
            total += ticks_to_micros(
                entry.tick - position,
                tempo,
                ticks_per_quarter,
                NORMAL_SPEED_PERMILLE,
            );
            position = entry.tick;
            tempo = entry.micros_per_quarter;
        }

        total + ticks_to_micros(to - position, tempo, ticks_per_quarter, NORMAL_SPEED_PERMILLE)
    }
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::constant(DEFAULT_MICROS_PER_QUARTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature_bar_length() {
        assert_eq!(TimeSignature::four_four().ticks_per_bar(480), 1920);
        assert_eq!(TimeSignature::three_four().ticks_per_bar(480), 1440);
        assert_eq!(TimeSignature::six_eight().ticks_per_bar(480), 1440);
        assert_eq!(TimeSignature::four_four().ticks_per_bar(96), 384);
    }

    #[test]
    fn test_time_signature_display() {
        assert_eq!(TimeSignature::six_eight().to_string(), "6/8");
    }

    #[test]
    #[should_panic(expected = "Time signature denominator must be power of 2")]
    fn test_invalid_time_signature() {
        TimeSignature::new(4, 3);
    }

    #[test]
    fn test_tempo_conversion() {
        assert_eq!(Tempo::new(120.0).micros_per_quarter(), 500_000);
        assert_eq!(Tempo::new(60.0).micros_per_quarter(), 1_000_000);
        assert_eq!(Tempo::new(90.0).micros_per_quarter(), 666_667);

        let tempo = Tempo::from_micros_per_quarter(500_000).unwrap();
        assert_eq!(tempo.bpm(), 120.0);
        assert!(Tempo::from_micros_per_quarter(0).is_none());
    }

    #[test]
    fn test_tempo_checked_range() {
        assert!(Tempo::checked(19.9).is_none());
        assert!(Tempo::checked(1000.0).is_none());
        assert!(Tempo::checked(f64::NAN).is_none());
        assert_eq!(Tempo::checked(140.0).unwrap().bpm(), 140.0);
    }

    #[test]
    #[should_panic(expected = "BPM must be between 20 and 999")]
    fn test_invalid_tempo() {
        Tempo::new(5.0);
    }

    #[test]
    fn test_quarter_note_deadline_is_exact() {
        assert_eq!(ticks_to_micros(480, 500_000, 480, 1000), 500_000);
        assert_eq!(ticks_to_micros(240, 500_000, 480, 1000), 250_000);
        // Double speed halves every delta
        assert_eq!(ticks_to_micros(480, 500_000, 480, 2000), 250_000);
    }

    #[test]
    fn test_tempo_map_default_entry() {
        let map = TempoMap::from_events(&[]);
        assert_eq!(
            map.entries(),
            &[TempoEntry {
                tick: 0,
                micros_per_quarter: DEFAULT_MICROS_PER_QUARTER
            }]
        );
    }

    #[test]
    fn test_tempo_map_lookup_and_integration() {
        let tempo = |tick, micros_per_quarter| {
            MidiEvent::new(tick, 0, EventKind::TempoChange { micros_per_quarter })
        };
        let events = [
            tempo(960, 1_000_000),
            tempo(1920, 250_000),
            tempo(1920, 400_000),
        ];
        let map = TempoMap::from_events(&events);

        assert_eq!(map.entries().len(), 3);
        assert_eq!(map.micros_per_quarter_at(0), 500_000);
        assert_eq!(map.micros_per_quarter_at(959), 500_000);
        assert_eq!(map.micros_per_quarter_at(960), 1_000_000);
        assert_eq!(map.micros_per_quarter_at(5000), 400_000);

        // Two beats at 120 BPM, two beats at 60 BPM, one beat at 150 BPM
        assert_eq!(map.micros_between(0, 2400, 480), 1_000_000 + 2_000_000 + 400_000);
        assert_eq!(map.micros_between(480, 480, 480), 0);
    }
}
