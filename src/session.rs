// Session - the single owner of project, file, scheduler and output
// Everything the poll loop touches is reached through here

use crate::config::EngineConfig;
use crate::messaging::channels::{
    CommandConsumer, NotificationConsumer, NotificationProducer, create_notification_channel,
};
use crate::messaging::command::{ChannelSetting, Command};
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::midi::event::MidiEvent;
use crate::midi::input::{LiveInputConsumer, LiveInputProducer, create_live_input_channel};
use crate::midi::smf::{self, DecodeError, Smf};
use crate::output::dispatcher::{
    CC_CHORUS_SEND, CC_REVERB_SEND, DispatchStats, Dispatcher, MAX_MASTER_VOLUME,
};
use crate::output::transport::Transport;
use crate::project::types::{CHANNEL_COUNT, ChannelTable, Project};
use crate::sequencer::grid::{GridError, SequencerGrid};
use crate::sequencer::scheduler::{
    EventSink, EventSource, PlaybackOptions, PollOutcome, Scheduler, Timeline,
};
use crate::sequencer::timeline::{NORMAL_SPEED_PERMILLE, Tempo, TimeSignature};
use crate::sequencer::transport::{PlaybackCursor, PlaybackMode, SharedPlaybackState};
use ringbuf::traits::{Consumer, Producer};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Grid edit failed: {0}")]
    Grid(#[from] GridError),

    #[error("Could not load MIDI file: {0}")]
    Decode(#[from] DecodeError),

    #[error("Tempo {0} BPM is outside the supported range")]
    InvalidTempo(f64),

    #[error("Speed {0} is outside 0.25 - 4.0")]
    InvalidSpeed(f64),

    #[error("Transpose {0} is outside -12..=12")]
    InvalidTranspose(i8),

    #[error("Bar {bar} is outside the timeline ({bars} bars)")]
    SeekOutOfRange { bar: usize, bars: usize },

    #[error("{command} is not allowed while {mode}")]
    InvalidState {
        command: &'static str,
        mode: PlaybackMode,
    },

    #[error("Channel {0} out of range (0-15)")]
    InvalidChannel(u8),

    #[error("Invalid channel setting: {0}")]
    InvalidSetting(String),
}

/// What happened to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Grid edit held until playback pauses or stops
    Queued,
}

/// Endpoints handed to the threads around the session
pub struct SessionHandles {
    /// Feed for the MIDI-IN callback
    pub live_input: LiveInputProducer,
    pub notifications: NotificationConsumer,
    pub playback: Arc<SharedPlaybackState>,
}

/// Routes scheduler output through the dispatcher with the current channel table
struct DispatchSink<'a, T: Transport> {
    dispatcher: &'a mut Dispatcher<T>,
    channels: &'a ChannelTable,
}

impl<T: Transport> EventSink for DispatchSink<'_, T> {
    fn emit(&mut self, event: &MidiEvent, source: EventSource) {
        self.dispatcher.dispatch(event, source, self.channels);
    }

    fn release_notes(&mut self, sources: &[EventSource]) {
        self.dispatcher.release(sources);
    }
}

pub struct Session<T: Transport> {
    project: Project,
    smf: Option<Smf>,
    scheduler: Scheduler,
    dispatcher: Dispatcher<T>,
    live_input: LiveInputConsumer,
    notifications: NotificationProducer,
    pending_edits: VecDeque<Command>,
    live_channel: Option<u8>,
    playback: Arc<SharedPlaybackState>,
}

impl<T: Transport> Session<T> {
    pub fn new(config: &EngineConfig, transport: T) -> (Self, SessionHandles) {
        let (live_tx, live_rx) = create_live_input_channel(config.live_queue_capacity.max(1));
        let (notify_tx, notify_rx) = create_notification_channel(config.notification_capacity.max(1));
        let playback = SharedPlaybackState::new();

        let grid = SequencerGrid::new(
            config.default_bars.max(1),
            config.default_steps_per_bar.clamp(1, SequencerGrid::MAX_STEPS_PER_BAR),
            config.default_tracks.max(1),
            TimeSignature::four_four(),
            config.ticks_per_quarter.max(1),
        );
        let project = Project::new("Untitled Project".to_string(), grid, config.default_tempo());

        let mut scheduler = Scheduler::new();
        scheduler.set_micros_per_quarter(project.tempo.micros_per_quarter());
        let mut dispatcher = Dispatcher::new(transport);
        dispatcher.set_master_volume(project.master_volume);

        let session = Self {
            project,
            smf: None,
            scheduler,
            dispatcher,
            live_input: live_rx,
            notifications: notify_tx,
            pending_edits: VecDeque::new(),
            live_channel: config.live_channel,
            playback: Arc::clone(&playback),
        };
        let handles = SessionHandles {
            live_input: live_tx,
            notifications: notify_rx,
            playback,
        };
        (session, handles)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn smf(&self) -> Option<&Smf> {
        self.smf.as_ref()
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.scheduler.cursor()
    }

    pub fn options(&self) -> PlaybackOptions {
        self.scheduler.options()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn pending_edits(&self) -> usize {
        self.pending_edits.len()
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.dispatcher.transport_mut()
    }

    /// Decode and install a MIDI file
    ///
    /// Decoding happens before anything changes, so a bad file leaves the
    /// session exactly as it was.
    pub fn load_smf(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let file = match smf::decode(bytes) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!("MIDI file rejected: {}", e);
                self.notify(Notification::error(NotificationCategory::File, e.to_string()));
                return Err(e.into());
            }
        };

        self.stop_playback();
        let summary = format!(
            "Loaded MIDI file: format {}, {} tracks, {} notes, {:.1}s",
            file.format,
            file.track_count,
            file.note_count(),
            file.duration_micros() as f64 / 1_000_000.0
        );
        tracing::info!("{}", summary);
        self.smf = Some(file);
        self.notify(Notification::info(NotificationCategory::File, summary));
        Ok(())
    }

    pub fn unload_smf(&mut self) {
        self.stop_playback();
        if self.smf.take().is_some() {
            self.scheduler
                .set_micros_per_quarter(self.project.tempo.micros_per_quarter());
            tracing::info!("MIDI file unloaded");
        }
    }

    /// Replace the project; playback stops and queued edits are discarded
    pub fn load_project(&mut self, project: Project) {
        self.stop_playback();
        self.pending_edits.clear();
        self.project = project;
        self.scheduler
            .set_micros_per_quarter(self.project.tempo.micros_per_quarter());
        self.scheduler.set_end_bar(self.project.end_bar);
        self.dispatcher.set_master_volume(self.project.master_volume);
        self.notify(Notification::info(
            NotificationCategory::Grid,
            format!("Project '{}' loaded", self.project.metadata.name),
        ));
    }

    /// Handle every command waiting on the control channel
    pub fn drain_commands(&mut self, commands: &mut CommandConsumer) {
        while let Some(command) = commands.try_pop() {
            if let Err(e) = self.handle(command) {
                tracing::warn!("Command {:?} failed: {}", command, e);
                self.notify(Notification::warning(NotificationCategory::Playback, e.to_string()));
            }
        }
    }

    pub fn handle(&mut self, command: Command) -> Result<CommandOutcome, SessionError> {
        if command.is_grid_edit() && self.scheduler.mode() == PlaybackMode::Playing {
            self.pending_edits.push_back(command);
            tracing::debug!("Queued {:?} until playback pauses", command);
            return Ok(CommandOutcome::Queued);
        }

        match command {
            Command::EditSlot { .. }
            | Command::AdjustVelocity { .. }
            | Command::InsertBar(_)
            | Command::DeleteBar(_)
            | Command::ClearChannel { .. }
            | Command::ClearAll
            | Command::SetRepeatMarker(_)
            | Command::ClearRepeatMarkers(_) => self.apply_edit(command)?,
            Command::Play => {
                if self.scheduler.mode() == PlaybackMode::Stopped {
                    self.dispatcher.send_channel_setup(&self.project.channels);
                }
                if self.with_playback(|scheduler, timeline, sink| scheduler.play(timeline, sink)) {
                    self.notify(Notification::info(
                        NotificationCategory::Playback,
                        format!("Playing from bar {}", self.cursor().current_bar + 1),
                    ));
                }
            }
            Command::Pause => {
                if self.with_playback(|scheduler, _, sink| scheduler.pause(sink)) {
                    self.apply_pending_edits();
                }
            }
            Command::Stop => self.stop_playback(),
            Command::Seek(bar) => {
                let accepted =
                    self.with_playback(|scheduler, timeline, sink| scheduler.seek(bar, timeline, sink));
                if !accepted {
                    let bars = self.with_playback(|scheduler, timeline, _| scheduler.bar_count(timeline));
                    return Err(SessionError::SeekOutOfRange { bar, bars });
                }
            }
            Command::SetTempo(bpm) => {
                let tempo = Tempo::checked(bpm).ok_or(SessionError::InvalidTempo(bpm))?;
                self.project.tempo = tempo;
                if self.smf.is_none() {
                    self.scheduler.set_micros_per_quarter(tempo.micros_per_quarter());
                }
                tracing::debug!("Project tempo {}", tempo);
            }
            Command::SetChannelSetting { channel, setting } => {
                self.set_channel_setting(channel, setting)?;
            }
            Command::SetStepsPerBar(steps) => {
                let mode = self.scheduler.mode();
                if mode != PlaybackMode::Stopped {
                    return Err(SessionError::InvalidState {
                        command: "changing resolution",
                        mode,
                    });
                }
                let report = self.project.grid.set_steps_per_bar(steps)?;
                if report.dropped > 0 {
                    self.notify(Notification::warning(
                        NotificationCategory::Grid,
                        format!("{} slots merged by the new resolution", report.dropped),
                    ));
                }
            }
            Command::SetSpeed(factor) => {
                if !(0.25..=4.0).contains(&factor) {
                    return Err(SessionError::InvalidSpeed(factor));
                }
                let permille = (factor * NORMAL_SPEED_PERMILLE as f64).round() as u32;
                self.scheduler.set_speed(permille);
            }
            Command::SetTranspose(semitones) => {
                if !(-12..=12).contains(&semitones) {
                    return Err(SessionError::InvalidTranspose(semitones));
                }
                self.with_playback(|scheduler, _, sink| scheduler.set_transpose(semitones, sink));
            }
            Command::SetVelocityOffset(offset) => self.scheduler.set_velocity_offset(offset),
            Command::SetLiveChannel(channel) => {
                if let Some(channel) = channel
                    && channel as usize >= CHANNEL_COUNT
                {
                    return Err(SessionError::InvalidChannel(channel));
                }
                self.live_channel = channel;
            }
            Command::SetMasterVolume(volume) => {
                if volume > MAX_MASTER_VOLUME {
                    return Err(SessionError::InvalidSetting(format!(
                        "master volume {} exceeds {}",
                        volume, MAX_MASTER_VOLUME
                    )));
                }
                self.project.master_volume = volume;
                self.dispatcher.set_master_volume(volume);
                self.project.metadata.touch();
            }
            Command::SetEndBar(end) => {
                if end == Some(0) {
                    return Err(SessionError::InvalidSetting(
                        "end bar must come after the first bar".to_string(),
                    ));
                }
                self.project.end_bar = end;
                self.scheduler.set_end_bar(end);
                self.project.metadata.touch();
            }
            Command::AllNotesOff => {
                let silenced = self.dispatcher.all_notes_off();
                tracing::debug!("All notes off sent on {} channels", silenced);
            }
        }
        Ok(CommandOutcome::Applied)
    }

    /// Run one scheduling step, then pass through live input
    pub fn poll(&mut self, now_micros: u64) -> PollOutcome {
        let outcome =
            self.with_playback(|scheduler, timeline, sink| scheduler.poll(timeline, now_micros, sink));

        self.drain_live_input();

        for warning in self.scheduler.take_warnings() {
            tracing::warn!("{}", warning);
            self.notify(Notification::warning(NotificationCategory::Grid, warning.to_string()));
        }

        if outcome == PollOutcome::Finished {
            self.after_stop();
            self.notify(Notification::info(
                NotificationCategory::Playback,
                "Playback finished".to_string(),
            ));
        }

        self.playback.publish(&self.scheduler.cursor());
        outcome
    }

    fn with_playback<R>(
        &mut self,
        f: impl FnOnce(&mut Scheduler, &Timeline<'_>, &mut dyn EventSink) -> R,
    ) -> R {
        let timeline = Timeline {
            grid: &self.project.grid,
            file: self.smf.as_ref(),
            micros_per_quarter: self.project.tempo.micros_per_quarter(),
        };
        let mut sink = DispatchSink {
            dispatcher: &mut self.dispatcher,
            channels: &self.project.channels,
        };
        f(&mut self.scheduler, &timeline, &mut sink)
    }

    fn stop_playback(&mut self) {
        if self.with_playback(|scheduler, _, sink| scheduler.stop(sink)) {
            self.after_stop();
        }
        self.playback.publish(&self.scheduler.cursor());
    }

    /// Restore channel programs a file may have changed, then apply edits
    fn after_stop(&mut self) {
        self.dispatcher.send_channel_setup(&self.project.channels);
        self.apply_pending_edits();
    }

    fn drain_live_input(&mut self) {
        let tick = self.scheduler.cursor().current_tick;
        while let Some(message) = self.live_input.try_pop() {
            let Some(mut event) = MidiEvent::from_wire(message.as_bytes()) else {
                continue;
            };
            event.tick = tick;
            if let Some(channel) = self.live_channel {
                event.channel = channel;
            }
            self.dispatcher
                .dispatch(&event, EventSource::Live, &self.project.channels);
        }
    }

    fn apply_pending_edits(&mut self) {
        while let Some(command) = self.pending_edits.pop_front() {
            if let Err(e) = self.apply_edit(command) {
                tracing::warn!("Queued edit {:?} failed: {}", command, e);
                self.notify(Notification::warning(NotificationCategory::Grid, e.to_string()));
            }
        }
    }

    fn apply_edit(&mut self, command: Command) -> Result<(), SessionError> {
        let grid = &mut self.project.grid;
        match command {
            Command::EditSlot {
                bar,
                step,
                track,
                slot,
            } => {
                grid.set_slot(bar, step, track, slot)?;
            }
            Command::AdjustVelocity {
                bar,
                step,
                track,
                delta,
            } => {
                grid.adjust_velocity(bar, step, track, delta)?;
            }
            Command::InsertBar(at) => {
                grid.insert_bar(at)?;
                self.scheduler.grid_bar_inserted(at);
            }
            Command::DeleteBar(at) => {
                let removed = grid.delete_bar(at)?;
                self.scheduler.grid_bar_deleted(at);
                if !removed.is_empty() {
                    tracing::debug!("Deleting bar {} removed {} markers", at, removed.len());
                }
                for warning in self.project.grid.consistency_warnings() {
                    self.notify(Notification::warning(
                        NotificationCategory::Grid,
                        warning.to_string(),
                    ));
                }
            }
            Command::ClearChannel { channel, scope } => {
                grid.clear_channel(channel, scope)?;
            }
            Command::ClearAll => {
                grid.clear_all();
            }
            Command::SetRepeatMarker(marker) => grid.set_marker(marker)?,
            Command::ClearRepeatMarkers(bar) => {
                grid.clear_markers(bar);
            }
            other => {
                return Err(SessionError::InvalidSetting(format!(
                    "{:?} is not a grid edit",
                    other
                )));
            }
        }
        self.project.metadata.touch();
        Ok(())
    }

    fn set_channel_setting(&mut self, channel: u8, setting: ChannelSetting) -> Result<(), SessionError> {
        if channel as usize >= CHANNEL_COUNT {
            return Err(SessionError::InvalidChannel(channel));
        }
        let index = channel as usize;

        match setting {
            ChannelSetting::Program(value)
            | ChannelSetting::Bank(value)
            | ChannelSetting::Reverb(value)
            | ChannelSetting::Chorus(value)
                if value > 127 =>
            {
                return Err(SessionError::InvalidSetting(format!(
                    "value {} exceeds 127",
                    value
                )));
            }
            ChannelSetting::Program(program) => {
                self.project.channels[index].program = program;
                self.send_program(channel);
            }
            ChannelSetting::Bank(bank) => {
                self.project.channels[index].bank = bank;
                self.send_program(channel);
            }
            ChannelSetting::VolumeRatio(ratio) => {
                if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
                    return Err(SessionError::InvalidSetting(format!(
                        "volume ratio {} outside 0.0 - 1.0",
                        ratio
                    )));
                }
                self.project.channels[index].volume_ratio = ratio;
            }
            ChannelSetting::Muted(muted) => {
                self.project.channels[index].muted = muted;
                if muted {
                    self.dispatcher.release_channel(channel);
                }
            }
            ChannelSetting::Reverb(level) => {
                self.project.channels[index].reverb = level;
                self.send_control(channel, CC_REVERB_SEND, level);
            }
            ChannelSetting::Chorus(level) => {
                self.project.channels[index].chorus = level;
                self.send_control(channel, CC_CHORUS_SEND, level);
            }
        }
        self.project.metadata.touch();
        Ok(())
    }

    /// Bank select and program change for one channel
    fn send_program(&mut self, channel: u8) {
        let settings = self.project.channels[channel as usize];
        let events = [
            MidiEvent::control_change(0, channel, 0, settings.bank),
            MidiEvent::program_change(0, channel, settings.program),
        ];
        for event in events {
            self.dispatcher
                .dispatch(&event, EventSource::Live, &self.project.channels);
        }
    }

    fn send_control(&mut self, channel: u8, controller: u8, value: u8) {
        let event = MidiEvent::control_change(0, channel, controller, value);
        self.dispatcher
            .dispatch(&event, EventSource::Live, &self.project.channels);
    }

    fn notify(&mut self, notification: Notification) {
        // Full queue: the UI is behind, drop silently
        let _ = self.notifications.try_push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::transport::MemoryTransport;
    use crate::sequencer::repeat::{RepeatKind, RepeatMarker};
    use crate::sequencer::slot::SequencerSlot;

    fn session() -> (Session<MemoryTransport>, SessionHandles) {
        Session::new(&EngineConfig::default(), MemoryTransport::new())
    }

    fn edit(bar: usize, step: usize, pitch: u8) -> Command {
        Command::EditSlot {
            bar,
            step,
            track: 0,
            slot: Some(SequencerSlot::new(pitch, 100, 120, 0)),
        }
    }

    #[test]
    fn test_edits_queue_while_playing() {
        let (mut session, _handles) = session();
        session.handle(edit(0, 0, 60)).unwrap();
        session.handle(Command::Play).unwrap();

        assert_eq!(session.handle(edit(1, 0, 62)).unwrap(), CommandOutcome::Queued);
        assert!(session.project().grid.get_slot(1, 0, 0).unwrap().is_none());

        session.handle(Command::Pause).unwrap();
        assert_eq!(session.pending_edits(), 0);
        assert_eq!(session.project().grid.get_slot(1, 0, 0).unwrap().unwrap().pitch, 62);
    }

    #[test]
    fn test_resolution_change_requires_stop() {
        let (mut session, _handles) = session();
        session.handle(edit(0, 0, 60)).unwrap();
        session.handle(Command::Play).unwrap();
        session.handle(Command::Pause).unwrap();

        assert!(matches!(
            session.handle(Command::SetStepsPerBar(8)),
            Err(SessionError::InvalidState { .. })
        ));
        session.handle(Command::Stop).unwrap();
        assert!(session.handle(Command::SetStepsPerBar(8)).is_ok());
        assert_eq!(session.project().grid.steps_per_bar(), 8);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let (mut session, _handles) = session();
        assert!(matches!(
            session.handle(Command::SetTempo(5.0)),
            Err(SessionError::InvalidTempo(_))
        ));
        assert!(session.handle(Command::SetSpeed(8.0)).is_err());
        assert!(session.handle(Command::SetTranspose(13)).is_err());
        assert!(session.handle(Command::SetLiveChannel(Some(16))).is_err());
        assert!(matches!(
            session.handle(Command::Seek(99)),
            Err(SessionError::SeekOutOfRange { bar: 99, bars: 4 })
        ));
        assert!(matches!(
            session.handle(Command::SetChannelSetting {
                channel: 0,
                setting: ChannelSetting::VolumeRatio(1.5),
            }),
            Err(SessionError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_program_change_is_sent_immediately() {
        let (mut session, _handles) = session();
        session
            .handle(Command::SetChannelSetting {
                channel: 2,
                setting: ChannelSetting::Program(19),
            })
            .unwrap();

        assert_eq!(session.project().channels[2].program, 19);
        assert_eq!(session.transport().bytes(), vec![vec![0xB2, 0, 0], vec![0xC2, 19]]);
    }

    #[test]
    fn test_play_sends_channel_setup() {
        let (mut session, _handles) = session();
        session.handle(Command::Play).unwrap();
        // Bank, program, reverb and chorus for all 16 channels
        assert_eq!(session.transport().messages().len(), 64);
    }

    #[test]
    fn test_effect_and_master_settings() {
        let (mut session, _handles) = session();
        session
            .handle(Command::SetChannelSetting {
                channel: 3,
                setting: ChannelSetting::Reverb(70),
            })
            .unwrap();
        session
            .handle(Command::SetChannelSetting {
                channel: 3,
                setting: ChannelSetting::Chorus(20),
            })
            .unwrap();
        assert_eq!(session.transport().bytes(), vec![vec![0xB3, 91, 70], vec![0xB3, 93, 20]]);
        assert_eq!(session.project().channels[3].reverb, 70);

        assert!(session
            .handle(Command::SetChannelSetting {
                channel: 3,
                setting: ChannelSetting::Chorus(200),
            })
            .is_err());
        assert!(session.handle(Command::SetMasterVolume(128)).is_err());
        assert!(session.handle(Command::SetEndBar(Some(0))).is_err());

        session.handle(Command::SetMasterVolume(64)).unwrap();
        session.handle(Command::SetEndBar(Some(2))).unwrap();
        assert_eq!(session.project().master_volume, 64);
        assert_eq!(session.project().end_bar, Some(2));
        assert_eq!(session.stats().sent, 2);
    }

    #[test]
    fn test_end_bar_finishes_playback() {
        let (mut session, _handles) = session();
        session.handle(edit(0, 0, 60)).unwrap();
        session.handle(edit(1, 0, 62)).unwrap();
        session.handle(edit(2, 0, 64)).unwrap();
        session.handle(Command::SetEndBar(Some(2))).unwrap();
        session.handle(Command::Play).unwrap();

        let mut outcome = PollOutcome::Playing;
        let mut now = 0;
        while outcome == PollOutcome::Playing {
            outcome = session.poll(now);
            now += 100_000;
        }
        assert_eq!(outcome, PollOutcome::Finished);
        let ons: Vec<u8> = session
            .transport()
            .bytes()
            .into_iter()
            .filter(|b| b[0] & 0xF0 == 0x90)
            .map(|b| b[1])
            .collect();
        assert_eq!(ons, vec![60, 62]);
    }

    #[test]
    fn test_marker_edit_and_warning_notification() {
        let (mut session, mut handles) = session();
        session
            .handle(Command::SetRepeatMarker(RepeatMarker::new(1, RepeatKind::LoopStart)))
            .unwrap();
        session
            .handle(Command::SetRepeatMarker(RepeatMarker::new(
                2,
                RepeatKind::RepeatEnd { count: 1 },
            )))
            .unwrap();
        session.handle(Command::DeleteBar(1)).unwrap();

        let notification = handles.notifications.try_pop().unwrap();
        assert_eq!(notification.category, NotificationCategory::Grid);
        assert!(notification.message.contains("no loop start"));
    }

    #[test]
    fn test_live_channel_remap() {
        let (mut session, mut handles) = session();
        session.handle(Command::SetLiveChannel(Some(5))).unwrap();
        handles
            .live_input
            .try_push(crate::midi::event::WireMessage::new(&[0x90, 60, 100]).unwrap())
            .unwrap();

        session.poll(0);
        assert_eq!(session.transport().bytes(), vec![vec![0x95, 60, 100]]);
    }
}
