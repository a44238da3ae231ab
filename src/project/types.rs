// Types for project state and its persisted record

use serde::{Deserialize, Serialize};

use crate::sequencer::grid::SequencerGrid;
use crate::sequencer::repeat::RepeatMarker;
use crate::sequencer::slot::SequencerSlot;
use crate::sequencer::timeline::{Tempo, TimeSignature};

pub const CHANNEL_COUNT: usize = 16;

/// Project format version
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProjectVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        Self::new(1, 0, 0)
    }

    /// Whether this build can read a record written with `self`
    pub fn is_supported(&self) -> bool {
        self.major == Self::current().major
    }
}

impl std::fmt::Display for ProjectVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Per-channel output settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Program number (0-127)
    pub program: u8,
    /// Bank select MSB (0-127), sent as CC0
    #[serde(default)]
    pub bank: u8,
    /// Velocity scale (0.0 - 1.0)
    pub volume_ratio: f32,
    pub muted: bool,
    /// Reverb send level (0-127), sent as CC91
    #[serde(default)]
    pub reverb: u8,
    /// Chorus send level (0-127), sent as CC93
    #[serde(default)]
    pub chorus: u8,
}

impl ChannelSettings {
    pub fn is_valid(&self) -> bool {
        self.program <= 127
            && self.bank <= 127
            && self.reverb <= 127
            && self.chorus <= 127
            && self.volume_ratio.is_finite()
            && (0.0..=1.0).contains(&self.volume_ratio)
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            program: 0,
            bank: 0,
            volume_ratio: 1.0,
            muted: false,
            reverb: 0,
            chorus: 0,
        }
    }
}

pub type ChannelTable = [ChannelSettings; CHANNEL_COUNT];

pub const DEFAULT_MASTER_VOLUME: u8 = 127;

fn default_master_volume() -> u8 {
    DEFAULT_MASTER_VOLUME
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectMetadata {
    pub name: String,
    /// Version of the project format
    pub version: ProjectVersion,
    /// RFC 3339 creation timestamp
    pub created: String,
    /// RFC 3339 last modification timestamp
    pub modified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectMetadata {
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name,
            version: ProjectVersion::current(),
            created: now.clone(),
            modified: now,
            author: None,
            description: None,
        }
    }

    /// Stamp the modification time
    pub fn touch(&mut self) {
        self.modified = chrono::Utc::now().to_rfc3339();
    }
}

/// One filled grid cell in the flat record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotRecord {
    pub bar: usize,
    pub step: usize,
    pub track: usize,
    pub pitch: u8,
    pub velocity: u8,
    pub gate_ticks: u32,
    pub channel: u8,
}

impl SlotRecord {
    pub fn slot(&self) -> SequencerSlot {
        SequencerSlot::new(self.pitch, self.velocity, self.gate_ticks, self.channel)
    }
}

/// Flat, serializable snapshot of a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRecord {
    pub metadata: ProjectMetadata,
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub ticks_per_quarter: u32,
    pub channels: Vec<ChannelSettings>,
    pub bar_count: usize,
    pub steps_per_bar: usize,
    pub track_count: usize,
    pub slots: Vec<SlotRecord>,
    #[serde(default)]
    pub markers: Vec<RepeatMarker>,
    #[serde(default = "default_master_volume")]
    pub master_volume: u8,
    /// Bar where playback stops; absent plays to the end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_bar: Option<usize>,
}

/// Live project state: the grid, tempo and channel settings
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub metadata: ProjectMetadata,
    pub tempo: Tempo,
    pub channels: ChannelTable,
    pub grid: SequencerGrid,
    /// 0-127, applied to every note on top of the channel ratios
    pub master_volume: u8,
    /// Playback stops on reaching this bar
    pub end_bar: Option<usize>,
}

impl Project {
    pub fn new(name: String, grid: SequencerGrid, tempo: Tempo) -> Self {
        Self {
            metadata: ProjectMetadata::new(name),
            tempo,
            channels: [ChannelSettings::default(); CHANNEL_COUNT],
            grid,
            master_volume: DEFAULT_MASTER_VOLUME,
            end_bar: None,
        }
    }

    /// Flatten into a record for persistence
    pub fn to_record(&self) -> ProjectRecord {
        let grid = &self.grid;
        ProjectRecord {
            metadata: self.metadata.clone(),
            bpm: self.tempo.bpm(),
            time_signature: grid.time_signature(),
            ticks_per_quarter: grid.ticks_per_quarter(),
            channels: self.channels.to_vec(),
            bar_count: grid.bar_count(),
            steps_per_bar: grid.steps_per_bar(),
            track_count: grid.track_count(),
            slots: grid
                .filled_slots()
                .map(|((bar, step, track), slot)| SlotRecord {
                    bar,
                    step,
                    track,
                    pitch: slot.pitch,
                    velocity: slot.velocity,
                    gate_ticks: slot.gate_ticks,
                    channel: slot.channel,
                })
                .collect(),
            markers: grid.markers().to_vec(),
            master_volume: self.master_volume,
            end_bar: self.end_bar,
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new(
            "Untitled Project".to_string(),
            SequencerGrid::default(),
            Tempo::default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::repeat::RepeatKind;

    #[test]
    fn test_project_version() {
        let version = ProjectVersion::new(1, 2, 3);
        assert_eq!(version.to_string(), "1.2.3");
        assert!(version.is_supported());
        assert!(!ProjectVersion::new(2, 0, 0).is_supported());
    }

    #[test]
    fn test_channel_settings_validity() {
        assert!(ChannelSettings::default().is_valid());
        let loud = ChannelSettings {
            volume_ratio: 1.5,
            ..ChannelSettings::default()
        };
        assert!(!loud.is_valid());
        let nan = ChannelSettings {
            volume_ratio: f32::NAN,
            ..ChannelSettings::default()
        };
        assert!(!nan.is_valid());
        let wet = ChannelSettings {
            reverb: 128,
            ..ChannelSettings::default()
        };
        assert!(!wet.is_valid());
    }

    #[test]
    fn test_to_record_flattens_grid() {
        let mut project = Project::default();
        project
            .grid
            .set_slot(1, 2, 3, Some(SequencerSlot::new(64, 90, 240, 5)))
            .unwrap();
        project
            .grid
            .set_marker(RepeatMarker::new(1, RepeatKind::LoopStart))
            .unwrap();
        project.channels[5].program = 24;

        let record = project.to_record();

        assert_eq!(record.bpm, 120.0);
        assert_eq!(record.channels.len(), CHANNEL_COUNT);
        assert_eq!(record.channels[5].program, 24);
        assert_eq!((record.bar_count, record.steps_per_bar, record.track_count), (4, 16, 8));
        assert_eq!(
            record.slots,
            vec![SlotRecord {
                bar: 1,
                step: 2,
                track: 3,
                pitch: 64,
                velocity: 90,
                gate_ticks: 240,
                channel: 5,
            }]
        );
        assert_eq!(record.markers.len(), 1);
    }

    #[test]
    fn test_metadata_timestamps_parse() {
        let metadata = ProjectMetadata::new("Test".to_string());
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.created).is_ok());
        assert_eq!(metadata.version, ProjectVersion::current());
    }
}
