// Sequencer grid - bars x steps x tracks of note slots, plus repeat signs
// Pure data container; the scheduler reads it, the session edits it

use crate::midi::event::MidiEvent;
use crate::sequencer::repeat::{self, GridConsistencyWarning, RepeatKind, RepeatMarker};
use crate::sequencer::slot::SequencerSlot;
use crate::sequencer::timeline::TimeSignature;

/// Grid edit errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Bar {bar} out of range (grid has {bars} bars)")]
    BarOutOfRange { bar: usize, bars: usize },

    #[error("Step {step} out of range ({steps} steps per bar)")]
    StepOutOfRange { step: usize, steps: usize },

    #[error("Track {track} out of range (grid has {tracks} tracks)")]
    TrackOutOfRange { track: usize, tracks: usize },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Channel {0} out of range (0-15)")]
    InvalidChannel(u8),

    #[error("Cannot delete the only bar")]
    LastBar,

    #[error("Invalid resolution: {0} steps per bar")]
    InvalidResolution(usize),

    #[error("Invalid repeat marker: {0}")]
    InvalidMarker(String),
}

/// Which bars `clear_channel` touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    CurrentBar(usize),
    AllBars,
}

/// Result of a resolution change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolutionReport {
    /// Slots kept at their quantized position
    pub moved: usize,
    /// Slots that landed on an occupied step and were dropped
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Bar {
    /// Step-major: index = step * track_count + track
    slots: Vec<Option<SequencerSlot>>,
}

impl Bar {
    fn empty(steps: usize, tracks: usize) -> Self {
        Self {
            slots: vec![None; steps * tracks],
        }
    }
}

/// The step sequencer
///
/// Every bar shares one resolution (`steps_per_bar`). Step `s` of a bar
/// starts `s * ticks_per_bar / steps_per_bar` ticks into it, so changing the
/// resolution never changes the bar length.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerGrid {
    steps_per_bar: usize,
    track_count: usize,
    time_signature: TimeSignature,
    ticks_per_quarter: u32,
    bars: Vec<Bar>,
    /// Sorted by (position, kind)
    markers: Vec<RepeatMarker>,
}

impl SequencerGrid {
    pub const MAX_STEPS_PER_BAR: usize = 192;

    /// Create an empty grid
    pub fn new(
        bar_count: usize,
        steps_per_bar: usize,
        track_count: usize,
        time_signature: TimeSignature,
        ticks_per_quarter: u32,
    ) -> Self {
        assert!(bar_count > 0, "Grid must have at least 1 bar");
        assert!(
            (1..=Self::MAX_STEPS_PER_BAR).contains(&steps_per_bar),
            "Steps per bar must be between 1 and 192"
        );
        assert!(track_count > 0, "Grid must have at least 1 track");
        assert!(ticks_per_quarter > 0, "Ticks per quarter must be > 0");

        Self {
            steps_per_bar,
            track_count,
            time_signature,
            ticks_per_quarter,
            bars: (0..bar_count)
                .map(|_| Bar::empty(steps_per_bar, track_count))
                .collect(),
            markers: Vec::new(),
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn steps_per_bar(&self) -> usize {
        self.steps_per_bar
    }

    pub fn track_count(&self) -> usize {
        self.track_count
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    pub fn ticks_per_bar(&self) -> u64 {
        self.time_signature.ticks_per_bar(self.ticks_per_quarter)
    }

    /// Offset of a step from the start of its bar
    pub fn step_offset(&self, step: usize) -> u64 {
        step as u64 * self.ticks_per_bar() / self.steps_per_bar as u64
    }

    /// Absolute tick where `(bar, step)` starts
    pub fn step_tick(&self, bar: usize, step: usize) -> u64 {
        bar as u64 * self.ticks_per_bar() + self.step_offset(step)
    }

    /// Tick just past the last bar
    pub fn end_tick(&self) -> u64 {
        self.bar_count() as u64 * self.ticks_per_bar()
    }

    fn check(&self, bar: usize, step: usize, track: usize) -> Result<usize, GridError> {
        if bar >= self.bars.len() {
            return Err(GridError::BarOutOfRange {
                bar,
                bars: self.bars.len(),
            });
        }
        if step >= self.steps_per_bar {
            return Err(GridError::StepOutOfRange {
                step,
                steps: self.steps_per_bar,
            });
        }
        if track >= self.track_count {
            return Err(GridError::TrackOutOfRange {
                track,
                tracks: self.track_count,
            });
        }
        Ok(step * self.track_count + track)
    }

    pub fn get_slot(
        &self,
        bar: usize,
        step: usize,
        track: usize,
    ) -> Result<Option<&SequencerSlot>, GridError> {
        let index = self.check(bar, step, track)?;
        Ok(self.bars[bar].slots[index].as_ref())
    }

    /// Fill or empty a slot, returning what was there
    pub fn set_slot(
        &mut self,
        bar: usize,
        step: usize,
        track: usize,
        slot: Option<SequencerSlot>,
    ) -> Result<Option<SequencerSlot>, GridError> {
        let index = self.check(bar, step, track)?;
        if let Some(slot) = &slot {
            slot.validate()?;
        }
        Ok(std::mem::replace(&mut self.bars[bar].slots[index], slot))
    }

    /// Filled slots of one step, by track
    pub fn slots_at(
        &self,
        bar: usize,
        step: usize,
    ) -> impl Iterator<Item = (usize, &SequencerSlot)> + '_ {
        let tracks = self.track_count;
        let range = step * tracks..(step + 1) * tracks;
        self.bars
            .get(bar)
            .and_then(|b| b.slots.get(range))
            .unwrap_or(&[])
            .iter()
            .enumerate()
            .filter_map(|(track, slot)| slot.as_ref().map(|s| (track, s)))
    }

    /// Every filled slot as ((bar, step, track), slot), in grid order
    pub fn filled_slots(&self) -> impl Iterator<Item = ((usize, usize, usize), &SequencerSlot)> + '_ {
        let tracks = self.track_count;
        self.bars.iter().enumerate().flat_map(move |(bar, b)| {
            b.slots.iter().enumerate().filter_map(move |(index, slot)| {
                slot.as_ref()
                    .map(|s| ((bar, index / tracks, index % tracks), s))
            })
        })
    }

    pub fn step_has_notes(&self, bar: usize, step: usize) -> bool {
        self.slots_at(bar, step).next().is_some()
    }

    pub fn has_notes(&self) -> bool {
        self.filled_slots().next().is_some()
    }

    pub fn note_count(&self) -> usize {
        self.filled_slots().count()
    }

    /// Insert an empty bar before `at` (`at == bar_count` appends)
    ///
    /// Markers and skip targets at or after `at` move one bar later.
    pub fn insert_bar(&mut self, at: usize) -> Result<(), GridError> {
        if at > self.bars.len() {
            return Err(GridError::BarOutOfRange {
                bar: at,
                bars: self.bars.len(),
            });
        }

        self.bars
            .insert(at, Bar::empty(self.steps_per_bar, self.track_count));

        for marker in &mut self.markers {
            if marker.position >= at {
                marker.position += 1;
            }
            if let RepeatKind::Skip { target } = &mut marker.kind
                && *target >= at
            {
                *target += 1;
            }
        }

        tracing::debug!("Inserted bar {}, grid now {} bars", at, self.bars.len());
        Ok(())
    }

    /// Remove bar `at`, returning the markers that sat on it
    ///
    /// Markers after `at` move one bar earlier. A skip that targeted the
    /// deleted bar now targets the bar that took its place.
    pub fn delete_bar(&mut self, at: usize) -> Result<Vec<RepeatMarker>, GridError> {
        if at >= self.bars.len() {
            return Err(GridError::BarOutOfRange {
                bar: at,
                bars: self.bars.len(),
            });
        }
        if self.bars.len() == 1 {
            return Err(GridError::LastBar);
        }

        self.bars.remove(at);

        let (removed, kept): (Vec<_>, Vec<_>) =
            self.markers.drain(..).partition(|m| m.position == at);
        self.markers = kept;
        for marker in &mut self.markers {
            if marker.position > at {
                marker.position -= 1;
            }
            if let RepeatKind::Skip { target } = &mut marker.kind
                && *target > at
            {
                *target -= 1;
            }
        }

        for warning in self.consistency_warnings() {
            tracing::warn!("After deleting bar {}: {}", at, warning);
        }
        Ok(removed)
    }

    /// Empty every slot on `channel` within `scope`, returning how many
    pub fn clear_channel(&mut self, channel: u8, scope: ClearScope) -> Result<usize, GridError> {
        if channel > 15 {
            return Err(GridError::InvalidChannel(channel));
        }
        let bars = match scope {
            ClearScope::CurrentBar(bar) if bar >= self.bars.len() => {
                return Err(GridError::BarOutOfRange {
                    bar,
                    bars: self.bars.len(),
                });
            }
            ClearScope::CurrentBar(bar) => bar..bar + 1,
            ClearScope::AllBars => 0..self.bars.len(),
        };

        let mut cleared = 0;
        for bar in &mut self.bars[bars] {
            for slot in &mut bar.slots {
                if slot.is_some_and(|s| s.channel == channel) {
                    *slot = None;
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }

    /// Empty every slot on every channel
    pub fn clear_all(&mut self) -> usize {
        let mut cleared = 0;
        for slot in self.bars.iter_mut().flat_map(|b| b.slots.iter_mut()) {
            if slot.take().is_some() {
                cleared += 1;
            }
        }
        cleared
    }

    /// Nudge a slot's velocity, clamped to 1..=127
    pub fn adjust_velocity(
        &mut self,
        bar: usize,
        step: usize,
        track: usize,
        delta: i16,
    ) -> Result<Option<u8>, GridError> {
        let index = self.check(bar, step, track)?;
        Ok(self.bars[bar].slots[index].as_mut().map(|slot| {
            slot.velocity = (slot.velocity as i16 + delta).clamp(1, 127) as u8;
            slot.velocity
        }))
    }

    /// Change the resolution, moving each slot to the nearest new step
    ///
    /// Slots that collide keep the one from the earliest old step. A step
    /// that would round onto the next bar stays on the last step.
    pub fn set_steps_per_bar(&mut self, steps_per_bar: usize) -> Result<ResolutionReport, GridError> {
        if !(1..=Self::MAX_STEPS_PER_BAR).contains(&steps_per_bar) {
            return Err(GridError::InvalidResolution(steps_per_bar));
        }
        let old = self.steps_per_bar;
        let tracks = self.track_count;
        let mut report = ResolutionReport::default();

        for bar in &mut self.bars {
            let mut rebuilt = Bar::empty(steps_per_bar, tracks);
            for (index, slot) in bar.slots.iter().enumerate() {
                let Some(slot) = slot else { continue };
                let (step, track) = (index / tracks, index % tracks);
                let new_step = ((2 * step * steps_per_bar + old) / (2 * old)).min(steps_per_bar - 1);
                let target = &mut rebuilt.slots[new_step * tracks + track];
                if target.is_some() {
                    report.dropped += 1;
                } else {
                    *target = Some(*slot);
                    report.moved += 1;
                }
            }
            *bar = rebuilt;
        }

        self.steps_per_bar = steps_per_bar;
        tracing::debug!(
            "Resolution {} -> {} steps per bar ({} slots dropped)",
            old,
            steps_per_bar,
            report.dropped
        );
        Ok(report)
    }

    pub fn markers(&self) -> &[RepeatMarker] {
        &self.markers
    }

    /// Place a marker, replacing one of the same kind on that bar
    pub fn set_marker(&mut self, marker: RepeatMarker) -> Result<(), GridError> {
        if marker.position >= self.bars.len() {
            return Err(GridError::BarOutOfRange {
                bar: marker.position,
                bars: self.bars.len(),
            });
        }
        if let RepeatKind::Skip { target } = marker.kind
            && (target <= marker.position || target > self.bars.len())
        {
            return Err(GridError::InvalidMarker(format!(
                "skip on bar {} must target a later bar",
                marker.position
            )));
        }

        self.markers
            .retain(|m| !(m.position == marker.position && m.kind.same_variant(&marker.kind)));
        let index = self
            .markers
            .partition_point(|m| m.sort_key() < marker.sort_key());
        self.markers.insert(index, marker);
        Ok(())
    }

    /// Remove every marker on `bar`
    pub fn clear_markers(&mut self, bar: usize) -> usize {
        let before = self.markers.len();
        self.markers.retain(|m| m.position != bar);
        before - self.markers.len()
    }

    /// Restore markers from a snapshot, keeping the sort order
    pub(crate) fn replace_markers(&mut self, mut markers: Vec<RepeatMarker>) {
        markers.sort_by_key(|m| m.sort_key());
        self.markers = markers;
    }

    pub fn consistency_warnings(&self) -> Vec<GridConsistencyWarning> {
        repeat::consistency_warnings(&self.markers, self.bars.len())
    }

    /// The grid played straight through, ignoring repeat signs
    ///
    /// NoteOn at each step start, NoteOff after the gate. Within a tick,
    /// note-offs come first so a retriggered pitch is not cut short.
    pub fn derive_events(&self) -> Vec<MidiEvent> {
        let mut events = Vec::with_capacity(self.note_count() * 2);
        for ((bar, step, track), slot) in self.filled_slots() {
            if slot.velocity == 0 {
                continue;
            }
            let start = self.step_tick(bar, step);
            events.push(
                MidiEvent::note_on(start, slot.channel, slot.pitch, slot.velocity)
                    .with_track(track as u16),
            );
            events.push(
                MidiEvent::note_off(start + slot.gate_ticks as u64, slot.channel, slot.pitch)
                    .with_track(track as u16),
            );
        }
        events.sort_by_key(|e| {
            let is_on = matches!(e.kind, crate::midi::event::EventKind::NoteOn { .. });
            (e.tick, is_on)
        });
        events
    }
}

impl Default for SequencerGrid {
    fn default() -> Self {
        Self::new(4, 16, 8, TimeSignature::four_four(), 480)
    }
}
