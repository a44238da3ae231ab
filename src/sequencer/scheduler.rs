// Scheduler - Turns file events and grid steps into timed dispatches
// Walks the score bar by bar, honoring repeat signs, against a wall clock

use crate::midi::event::{EventKind, MidiEvent};
use crate::midi::smf::Smf;
use crate::sequencer::grid::SequencerGrid;
use crate::sequencer::repeat::{BarEnd, GridConsistencyWarning, RepeatState};
use crate::sequencer::timeline::{NORMAL_SPEED_PERMILLE, ticks_to_micros};
use crate::sequencer::transport::{PlaybackCursor, PlaybackMode};
use std::collections::BTreeMap;

/// Which producer an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSource {
    File,
    Grid,
    Live,
}

/// Receiver of scheduled events
///
/// The sink remembers which notes are sounding so that a stop, pause or
/// repeat jump can silence them without the scheduler tracking file notes.
pub trait EventSink {
    fn emit(&mut self, event: &MidiEvent, source: EventSource);

    /// Send NoteOff for every sounding note started by one of `sources`
    fn release_notes(&mut self, sources: &[EventSource]);
}

/// What the scheduler plays this poll
#[derive(Debug, Clone, Copy)]
pub struct Timeline<'a> {
    pub grid: &'a SequencerGrid,
    pub file: Option<&'a Smf>,
    /// Project tempo, used when no file is loaded
    pub micros_per_quarter: u32,
}

impl Timeline<'_> {
    /// Tick resolution of the merged timeline
    pub fn timebase(&self) -> u32 {
        self.file
            .map(|file| file.ticks_per_quarter as u32)
            .unwrap_or_else(|| self.grid.ticks_per_quarter())
            .max(1)
    }

    fn micros_per_quarter_at(&self, tick: u64) -> u32 {
        match self.file {
            Some(file) => file.tempo_map.micros_per_quarter_at(tick),
            None => self.micros_per_quarter,
        }
    }
}

/// Live adjustments applied to file playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    /// Semitones, -12..=12
    pub transpose: i8,
    /// Added to file NoteOn velocities
    pub velocity_offset: i8,
    /// 1000 = as written
    pub speed_permille: u32,
}

impl PlaybackOptions {
    pub const MIN_SPEED_PERMILLE: u32 = 250;
    pub const MAX_SPEED_PERMILLE: u32 = 4000;

    /// Transpose and velocity offset for a file event
    pub fn apply(&self, event: &MidiEvent) -> MidiEvent {
        let mut event = *event;
        match &mut event.kind {
            EventKind::NoteOn { key, velocity } => {
                *key = transpose_key(*key, self.transpose);
                *velocity = (*velocity as i16 + self.velocity_offset as i16).clamp(1, 127) as u8;
            }
            EventKind::NoteOff { key, .. } => {
                *key = transpose_key(*key, self.transpose);
            }
            _ => {}
        }
        event
    }
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            transpose: 0,
            velocity_offset: 0,
            speed_permille: NORMAL_SPEED_PERMILLE,
        }
    }
}

/// Shift a key, wrapping by octaves to stay within 0..=127
fn transpose_key(key: u8, semitones: i8) -> u8 {
    let mut shifted = key as i16 + semitones as i16;
    while shifted > 127 {
        shifted -= 12;
    }
    while shifted < 0 {
        shifted += 12;
    }
    shifted as u8
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not playing
    Idle,
    Playing,
    /// Reached the end of the score and stopped
    Finished,
}

/// Wall-clock time of a known play tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClockAnchor {
    play_tick: u64,
    micros: u64,
}

/// Grid note waiting for its gate to close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingOff {
    play_tick: u64,
    channel: u8,
    key: u8,
    track: u16,
}

/// Bar geometry of the timeline at the current timebase
#[derive(Debug, Clone, Copy)]
struct Layout {
    ticks_per_bar: u64,
    total_bars: usize,
    grid_ticks_per_quarter: u32,
}

impl Layout {
    fn new(timeline: &Timeline<'_>, timebase: u32) -> Self {
        let grid = timeline.grid;
        let ticks_per_bar = grid.time_signature().ticks_per_bar(timebase).max(1);

        // An empty grid does not stretch a loaded file
        let grid_bars = if timeline.file.is_none() || grid.has_notes() || !grid.markers().is_empty()
        {
            grid.bar_count()
        } else {
            0
        };
        let file_bars = timeline
            .file
            .map_or(0, |file| file.end_tick().div_ceil(ticks_per_bar) as usize);

        Self {
            ticks_per_bar,
            total_bars: grid_bars.max(file_bars),
            grid_ticks_per_quarter: grid.ticks_per_quarter(),
        }
    }

    fn bar_start(&self, bar: usize) -> u64 {
        bar as u64 * self.ticks_per_bar
    }

    fn step_tick(&self, grid: &SequencerGrid, bar: usize, step: usize) -> u64 {
        self.bar_start(bar) + step as u64 * self.ticks_per_bar / grid.steps_per_bar() as u64
    }
}

/// Playback engine
///
/// Two clocks run side by side. `play_tick` only moves forward and maps to
/// wall-clock time through the anchor. The cursor's `current_tick` is the
/// position in the score and jumps when repeat signs fire. Both advance by
/// the same amount between jumps.
pub struct Scheduler {
    cursor: PlaybackCursor,
    /// Bar that Play starts from
    start_bar: usize,
    /// Playback stops on reaching this bar
    end_bar: Option<usize>,
    /// `end_bar` as it applies to the current play
    play_end: Option<usize>,
    play_tick: u64,
    clock: Option<ClockAnchor>,
    micros_per_quarter: u32,
    timebase: u32,
    file_index: usize,
    grid_next_tick: u64,
    pending_offs: Vec<PendingOff>,
    repeats: RepeatState,
    warnings: Vec<GridConsistencyWarning>,
    options: PlaybackOptions,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            cursor: PlaybackCursor::default(),
            start_bar: 0,
            end_bar: None,
            play_end: None,
            play_tick: 0,
            clock: None,
            micros_per_quarter: crate::sequencer::timeline::DEFAULT_MICROS_PER_QUARTER,
            timebase: 480,
            file_index: 0,
            grid_next_tick: 0,
            pending_offs: Vec::new(),
            repeats: RepeatState::new(),
            warnings: Vec::new(),
            options: PlaybackOptions::default(),
        }
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn mode(&self) -> PlaybackMode {
        self.cursor.mode
    }

    pub fn options(&self) -> PlaybackOptions {
        self.options
    }

    /// Tempo currently driving deadlines
    pub fn micros_per_quarter(&self) -> u32 {
        self.micros_per_quarter
    }

    /// Bars in the timeline (file and grid combined)
    pub fn bar_count(&self, timeline: &Timeline<'_>) -> usize {
        Layout::new(timeline, timeline.timebase()).total_bars
    }

    /// Warnings raised by repeat signs since the last call
    pub fn take_warnings(&mut self) -> Vec<GridConsistencyWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Start from the seek point, or resume after a pause
    ///
    /// Returns false when already playing.
    pub fn play(&mut self, timeline: &Timeline<'_>, sink: &mut dyn EventSink) -> bool {
        match self.cursor.mode {
            PlaybackMode::Playing => false,
            PlaybackMode::Paused => {
                self.cursor.mode = PlaybackMode::Playing;
                self.clock = None;
                tracing::debug!("Resumed at tick {}", self.cursor.current_tick);
                true
            }
            PlaybackMode::Stopped => {
                self.timebase = timeline.timebase();
                let layout = Layout::new(timeline, self.timebase);

                self.repeats.reset();
                self.pending_offs.clear();
                self.play_tick = 0;
                self.clock = None;
                self.cursor = PlaybackCursor {
                    mode: PlaybackMode::Playing,
                    ..PlaybackCursor::default()
                };
                self.play_end = self.end_bar.filter(|&end| end > self.start_bar);
                self.jump_to(self.start_bar, timeline, &layout, sink);
                self.micros_per_quarter = timeline.micros_per_quarter_at(self.cursor.current_tick);
                if self.cursor.current_tick > 0 {
                    self.chase(timeline, sink);
                }

                tracing::info!(
                    "Playback started at bar {} ({} bars, {} tpq)",
                    self.start_bar + 1,
                    layout.total_bars,
                    self.timebase
                );
                true
            }
        }
    }

    /// Freeze the cursor and silence scheduled notes
    pub fn pause(&mut self, sink: &mut dyn EventSink) -> bool {
        if self.cursor.mode != PlaybackMode::Playing {
            return false;
        }
        self.silence(sink);
        self.cursor.mode = PlaybackMode::Paused;
        tracing::debug!("Paused at tick {}", self.cursor.current_tick);
        true
    }

    /// Silence scheduled notes and rewind to the start
    pub fn stop(&mut self, sink: &mut dyn EventSink) -> bool {
        let was_active = self.cursor.mode != PlaybackMode::Stopped;
        if was_active {
            self.silence(sink);
        }
        self.cursor = PlaybackCursor::default();
        self.start_bar = 0;
        self.play_end = None;
        self.play_tick = 0;
        self.file_index = 0;
        self.grid_next_tick = 0;
        if was_active {
            tracing::info!("Playback stopped");
        }
        was_active
    }

    /// Move to the start of `bar`
    ///
    /// While stopped this sets where Play begins. While playing or paused it
    /// jumps immediately and chases program, controller and tempo state from
    /// the file. Returns false when `bar` is outside the timeline.
    pub fn seek(&mut self, bar: usize, timeline: &Timeline<'_>, sink: &mut dyn EventSink) -> bool {
        let timebase = match self.cursor.mode {
            PlaybackMode::Stopped => timeline.timebase(),
            _ => self.timebase,
        };
        let layout = Layout::new(timeline, timebase);
        if bar >= layout.total_bars.max(1) {
            return false;
        }

        if self.cursor.mode == PlaybackMode::Stopped {
            self.start_bar = bar;
            self.cursor.current_bar = bar;
            self.cursor.current_tick = layout.bar_start(bar);
            return true;
        }

        self.silence(sink);
        self.repeats.reset();
        self.cursor.active_repeat = None;
        self.play_end = self.end_bar.filter(|&end| end > bar);
        self.jump_to(bar, timeline, &layout, sink);
        self.clock = None;
        self.chase(timeline, sink);
        tracing::debug!("Seek to bar {}", bar + 1);
        true
    }

    /// Stop playback on reaching `bar`, or play to the end of the score
    ///
    /// Ignored for a play that starts at or after `bar`.
    pub fn set_end_bar(&mut self, bar: Option<usize>) {
        self.end_bar = bar;
        self.play_end = match self.cursor.mode {
            PlaybackMode::Stopped => None,
            _ => bar.filter(|&end| end > self.cursor.current_bar),
        };
    }

    pub fn end_bar(&self) -> Option<usize> {
        self.end_bar
    }

    /// Keep repeat counters on their bars after a bar is inserted at `at`
    pub fn grid_bar_inserted(&mut self, at: usize) {
        self.repeats.insert_bar(at);
        if let Some(active) = self.cursor.active_repeat.as_mut()
            && active.bar >= at
        {
            active.bar += 1;
        }
    }

    /// Keep repeat counters on their bars after bar `at` is deleted
    pub fn grid_bar_deleted(&mut self, at: usize) {
        self.repeats.delete_bar(at);
        self.cursor.active_repeat = match self.cursor.active_repeat {
            Some(active) if active.bar == at => None,
            Some(mut active) if active.bar > at => {
                active.bar -= 1;
                Some(active)
            }
            other => other,
        };
    }

    /// Change the tempo driving deadlines from the current position on
    pub fn set_micros_per_quarter(&mut self, micros_per_quarter: u32) {
        self.change_tempo(micros_per_quarter.max(1));
    }

    pub fn set_speed(&mut self, speed_permille: u32) {
        let speed = speed_permille.clamp(
            PlaybackOptions::MIN_SPEED_PERMILLE,
            PlaybackOptions::MAX_SPEED_PERMILLE,
        );
        self.reanchor();
        self.options.speed_permille = speed;
    }

    /// Transpose file notes; sounding file notes are released first
    pub fn set_transpose(&mut self, semitones: i8, sink: &mut dyn EventSink) {
        let semitones = semitones.clamp(-12, 12);
        if semitones != self.options.transpose && self.cursor.mode.is_playing() {
            sink.release_notes(&[EventSource::File]);
        }
        self.options.transpose = semitones;
    }

    pub fn set_velocity_offset(&mut self, offset: i8) {
        self.options.velocity_offset = offset.clamp(-127, 127);
    }

    /// Dispatch everything due at `now_micros`
    pub fn poll(
        &mut self,
        timeline: &Timeline<'_>,
        now_micros: u64,
        sink: &mut dyn EventSink,
    ) -> PollOutcome {
        if self.cursor.mode != PlaybackMode::Playing {
            return PollOutcome::Idle;
        }

        let layout = Layout::new(timeline, self.timebase);
        if self.clock.is_none() {
            self.clock = Some(ClockAnchor {
                play_tick: self.play_tick,
                micros: now_micros,
            });
        }

        loop {
            let Some(next) = self.next_play_tick(timeline, &layout) else {
                tracing::info!("Reached end of score");
                self.stop(sink);
                return PollOutcome::Finished;
            };
            if self.deadline(next) > now_micros {
                return PollOutcome::Playing;
            }

            self.cursor.current_tick += next - self.play_tick;
            self.play_tick = next;
            self.process_tick(timeline, &layout, sink);
            if self.past_end_bar() {
                tracing::info!("Reached end bar {}", self.cursor.current_bar + 1);
                self.stop(sink);
                return PollOutcome::Finished;
            }
        }
    }

    fn past_end_bar(&self) -> bool {
        self.play_end.is_some_and(|end| self.cursor.current_bar >= end)
    }

    /// Wall-clock deadline of a play tick under the current anchor
    fn deadline(&self, play_tick: u64) -> u64 {
        match self.clock {
            Some(anchor) => {
                anchor.micros
                    + ticks_to_micros(
                        play_tick.saturating_sub(anchor.play_tick),
                        self.micros_per_quarter,
                        self.timebase,
                        self.options.speed_permille,
                    )
            }
            None => 0,
        }
    }

    /// Restart the clock at the current play tick so later changes do not
    /// move already elapsed deadlines
    fn reanchor(&mut self) {
        if self.clock.is_some() {
            self.clock = Some(ClockAnchor {
                play_tick: self.play_tick,
                micros: self.deadline(self.play_tick),
            });
        }
    }

    fn change_tempo(&mut self, micros_per_quarter: u32) {
        if micros_per_quarter != self.micros_per_quarter {
            self.reanchor();
            self.micros_per_quarter = micros_per_quarter;
            tracing::debug!(
                "Tempo {} us/qn at tick {}",
                micros_per_quarter,
                self.cursor.current_tick
            );
        }
    }

    fn next_play_tick(&self, timeline: &Timeline<'_>, layout: &Layout) -> Option<u64> {
        let current = self.cursor.current_tick;
        let file = timeline
            .file
            .and_then(|file| file.events.get(self.file_index))
            .map(|event| event.tick.max(current));
        let grid = self.next_grid_tick(timeline.grid, layout);
        let boundary = (self.cursor.current_bar < layout.total_bars)
            .then(|| layout.bar_start(self.cursor.current_bar + 1));

        let score = [file, grid, boundary]
            .into_iter()
            .flatten()
            .min()
            .map(|tick| self.play_tick + (tick - current));
        let off = self.pending_offs.iter().map(|off| off.play_tick).min();

        match (score, off) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Earliest non-empty step of the current bar not yet played
    fn next_grid_tick(&self, grid: &SequencerGrid, layout: &Layout) -> Option<u64> {
        let bar = self.cursor.current_bar;
        if bar >= grid.bar_count() {
            return None;
        }
        (0..grid.steps_per_bar())
            .map(|step| (step, layout.step_tick(grid, bar, step)))
            .find(|&(step, tick)| tick >= self.grid_next_tick && grid.step_has_notes(bar, step))
            .map(|(_, tick)| tick)
    }

    /// Everything at the cursor: bar boundary, then file, then grid
    fn process_tick(&mut self, timeline: &Timeline<'_>, layout: &Layout, sink: &mut dyn EventSink) {
        let tick = self.cursor.current_tick;
        if self.cursor.current_bar < layout.total_bars
            && tick == layout.bar_start(self.cursor.current_bar + 1)
            && (self.cross_bar_boundary(timeline, layout, sink) || self.past_end_bar())
        {
            return;
        }

        self.emit_file_events(timeline, sink);
        self.release_due_offs(sink);
        self.emit_grid_steps(timeline.grid, layout, sink);
    }

    /// Returns true when a repeat sign moved the cursor
    fn cross_bar_boundary(
        &mut self,
        timeline: &Timeline<'_>,
        layout: &Layout,
        sink: &mut dyn EventSink,
    ) -> bool {
        let markers = timeline.grid.markers();
        let bar = self.cursor.current_bar;

        match self.repeats.on_bar_end(markers, bar, &mut self.warnings) {
            BarEnd::Repeat { to_bar, active } => {
                tracing::debug!(
                    "Repeat at bar {} back to bar {} ({} left)",
                    bar + 1,
                    to_bar + 1,
                    active.remaining
                );
                self.jump_to(to_bar, timeline, layout, sink);
                self.cursor.active_repeat = Some(active);
                return true;
            }
            BarEnd::FallThrough { .. } => self.cursor.active_repeat = None,
            BarEnd::Continue => {}
        }

        self.cursor.current_bar += 1;
        let entered = self.cursor.current_bar;
        if let Some(target) =
            self.repeats
                .on_bar_enter(markers, entered, timeline.grid.bar_count(), &mut self.warnings)
        {
            tracing::debug!("Skip at bar {} to bar {}", entered + 1, target + 1);
            self.jump_to(target, timeline, layout, sink);
            return true;
        }
        false
    }

    /// Put the cursor at the start of `bar` without moving the clock
    fn jump_to(&mut self, bar: usize, timeline: &Timeline<'_>, layout: &Layout, sink: &mut dyn EventSink) {
        sink.release_notes(&[EventSource::File]);

        let tick = layout.bar_start(bar);
        self.cursor.current_bar = bar;
        self.cursor.current_tick = tick;
        self.grid_next_tick = tick;

        if let Some(file) = timeline.file {
            self.file_index = file.first_index_at(tick);
            self.change_tempo(file.tempo_map.micros_per_quarter_at(tick));
        } else {
            self.file_index = 0;
        }
    }

    /// Re-send the program, controller values and tempo in force before the cursor
    fn chase(&mut self, timeline: &Timeline<'_>, sink: &mut dyn EventSink) {
        let Some(file) = timeline.file else {
            return;
        };
        let tick = self.cursor.current_tick;
        let mut programs: [Option<u8>; 16] = [None; 16];
        let mut controllers: BTreeMap<(u8, u8), u8> = BTreeMap::new();

        for event in &file.events[..self.file_index.min(file.events.len())] {
            match event.kind {
                EventKind::ProgramChange { program } => {
                    programs[event.channel as usize & 0x0F] = Some(program);
                }
                EventKind::ControlChange { controller, value } => {
                    controllers.insert((event.channel, controller), value);
                }
                _ => {}
            }
        }

        for (channel, program) in programs.iter().enumerate() {
            if let Some(program) = program {
                sink.emit(
                    &MidiEvent::program_change(tick, channel as u8, *program),
                    EventSource::File,
                );
            }
        }
        for ((channel, controller), value) in controllers {
            sink.emit(
                &MidiEvent::control_change(tick, channel, controller, value),
                EventSource::File,
            );
        }
        self.change_tempo(file.tempo_map.micros_per_quarter_at(tick));
    }

    fn emit_file_events(&mut self, timeline: &Timeline<'_>, sink: &mut dyn EventSink) {
        let Some(file) = timeline.file else {
            return;
        };
        while let Some(event) = file.events.get(self.file_index)
            && event.tick <= self.cursor.current_tick
        {
            self.file_index += 1;
            match event.kind {
                EventKind::TempoChange { micros_per_quarter } => self.change_tempo(micros_per_quarter),
                EventKind::EndOfTrack => {}
                _ => sink.emit(&self.options.apply(event), EventSource::File),
            }
        }
    }

    fn release_due_offs(&mut self, sink: &mut dyn EventSink) {
        let play_tick = self.play_tick;
        let tick = self.cursor.current_tick;
        self.pending_offs.retain(|off| {
            if off.play_tick > play_tick {
                return true;
            }
            sink.emit(
                &MidiEvent::note_off(tick, off.channel, off.key).with_track(off.track),
                EventSource::Grid,
            );
            false
        });
    }

    fn emit_grid_steps(&mut self, grid: &SequencerGrid, layout: &Layout, sink: &mut dyn EventSink) {
        let bar = self.cursor.current_bar;
        let tick = self.cursor.current_tick;
        if bar >= grid.bar_count() || tick < self.grid_next_tick {
            return;
        }

        for step in 0..grid.steps_per_bar() {
            if layout.step_tick(grid, bar, step) != tick {
                continue;
            }
            for (track, slot) in grid.slots_at(bar, step) {
                if slot.velocity == 0 {
                    continue;
                }

                // Retrigger: close the previous note on this key first
                if let Some(index) = self
                    .pending_offs
                    .iter()
                    .position(|off| off.channel == slot.channel && off.key == slot.pitch)
                {
                    let off = self.pending_offs.swap_remove(index);
                    sink.emit(
                        &MidiEvent::note_off(tick, off.channel, off.key).with_track(off.track),
                        EventSource::Grid,
                    );
                }

                sink.emit(
                    &MidiEvent::note_on(tick, slot.channel, slot.pitch, slot.velocity)
                        .with_track(track as u16),
                    EventSource::Grid,
                );
                let gate = (slot.gate_ticks as u64 * self.timebase as u64
                    / layout.grid_ticks_per_quarter.max(1) as u64)
                    .max(1);
                self.pending_offs.push(PendingOff {
                    play_tick: self.play_tick + gate,
                    channel: slot.channel,
                    key: slot.pitch,
                    track: track as u16,
                });
            }
        }
        self.grid_next_tick = tick + 1;
    }

    /// Release scheduled notes and drop the clock
    fn silence(&mut self, sink: &mut dyn EventSink) {
        sink.release_notes(&[EventSource::File, EventSource::Grid]);
        self.pending_offs.clear();
        self.clock = None;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
