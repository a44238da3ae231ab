// Project state and its persistence boundary
// The record format is RON or JSON; the engine only needs it to round-trip

pub mod manager;
pub mod serialization;
pub mod types;

pub use manager::{ProjectError, ProjectFormat, ProjectManager};
pub use types::{
    CHANNEL_COUNT, ChannelSettings, ChannelTable, Project, ProjectMetadata, ProjectRecord,
    ProjectVersion, SlotRecord,
};

use crate::sequencer::grid::SequencerGrid;
use crate::sequencer::repeat::RepeatKind;
use crate::sequencer::timeline::Tempo;
use std::collections::HashSet;

/// Check a record before building a project from it
pub fn validate_record(record: &ProjectRecord) -> Result<(), ProjectError> {
    let invalid = |message: String| Err(ProjectError::InvalidStructure(message));

    if record.metadata.name.trim().is_empty() {
        return invalid("Project name cannot be empty".to_string());
    }
    if record.metadata.name.len() > 255 {
        return invalid("Project name cannot exceed 255 characters".to_string());
    }
    if !record.metadata.version.is_supported() {
        return Err(ProjectError::UnsupportedVersion(record.metadata.version));
    }

    if Tempo::checked(record.bpm).is_none() {
        return invalid(format!(
            "Tempo must be between {} and {} BPM",
            Tempo::MIN_BPM,
            Tempo::MAX_BPM
        ));
    }
    if !record.time_signature.is_valid() {
        return invalid(format!("Invalid time signature {}", record.time_signature));
    }
    if !(1..=32767).contains(&record.ticks_per_quarter) {
        return invalid("Ticks per quarter must be between 1 and 32767".to_string());
    }

    if record.channels.len() != CHANNEL_COUNT {
        return invalid(format!(
            "Expected {} channel settings, found {}",
            CHANNEL_COUNT,
            record.channels.len()
        ));
    }
    if let Some(channel) = record.channels.iter().position(|c| !c.is_valid()) {
        return invalid(format!("Channel {} settings out of range", channel + 1));
    }

    if record.bar_count == 0 {
        return invalid("Project must have at least one bar".to_string());
    }
    if !(1..=SequencerGrid::MAX_STEPS_PER_BAR).contains(&record.steps_per_bar) {
        return invalid(format!(
            "Steps per bar must be between 1 and {}",
            SequencerGrid::MAX_STEPS_PER_BAR
        ));
    }
    if record.track_count == 0 {
        return invalid("Project must have at least one track".to_string());
    }

    let mut cells = HashSet::new();
    for slot in &record.slots {
        if slot.bar >= record.bar_count
            || slot.step >= record.steps_per_bar
            || slot.track >= record.track_count
        {
            return invalid(format!(
                "Slot ({}, {}, {}) outside the grid",
                slot.bar, slot.step, slot.track
            ));
        }
        if !cells.insert((slot.bar, slot.step, slot.track)) {
            return invalid(format!(
                "Duplicate slot ({}, {}, {})",
                slot.bar, slot.step, slot.track
            ));
        }
        slot.slot()
            .validate()
            .map_err(|e| ProjectError::InvalidStructure(e.to_string()))?;
    }

    if record.master_volume > 127 {
        return invalid(format!("Master volume {} exceeds 127", record.master_volume));
    }
    if record.end_bar == Some(0) {
        return invalid("End bar must come after the first bar".to_string());
    }

    let mut kinds = HashSet::new();
    for marker in &record.markers {
        if marker.position >= record.bar_count {
            return invalid(format!("Marker {} outside the grid", marker));
        }
        if let RepeatKind::Skip { target } = marker.kind
            && (target <= marker.position || target > record.bar_count)
        {
            return invalid(format!("Marker {} targets an invalid bar", marker));
        }
        let rank = std::mem::discriminant(&marker.kind);
        if !kinds.insert((marker.position, rank)) {
            return invalid(format!("Duplicate marker {}", marker));
        }
    }

    Ok(())
}

impl Project {
    /// Rebuild a project from a validated record
    pub fn from_record(record: ProjectRecord) -> Result<Self, ProjectError> {
        validate_record(&record)?;

        let mut grid = SequencerGrid::new(
            record.bar_count,
            record.steps_per_bar,
            record.track_count,
            record.time_signature,
            record.ticks_per_quarter,
        );
        for slot in &record.slots {
            grid.set_slot(slot.bar, slot.step, slot.track, Some(slot.slot()))
                .map_err(|e| ProjectError::InvalidStructure(e.to_string()))?;
        }
        grid.replace_markers(record.markers);

        let mut channels = [ChannelSettings::default(); CHANNEL_COUNT];
        channels.copy_from_slice(&record.channels);

        let tempo = Tempo::checked(record.bpm)
            .ok_or_else(|| ProjectError::InvalidStructure(format!("Tempo {}", record.bpm)))?;

        Ok(Self {
            metadata: record.metadata,
            tempo,
            channels,
            grid,
            master_volume: record.master_volume,
            end_bar: record.end_bar,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::repeat::RepeatMarker;
    use crate::sequencer::slot::SequencerSlot;

    fn sample_project() -> Project {
        let mut project = Project::default();
        project.metadata.name = "Round Trip".to_string();
        project.tempo = Tempo::new(96.5);
        project.channels[9].volume_ratio = 0.5;
        project.channels[2].muted = true;
        project.channels[4].reverb = 64;
        project.channels[4].chorus = 20;
        project.master_volume = 100;
        project.end_bar = Some(3);
        project
            .grid
            .set_slot(0, 0, 0, Some(SequencerSlot::new(36, 127, 60, 9)))
            .unwrap();
        project
            .grid
            .set_slot(3, 15, 7, Some(SequencerSlot::new(72, 1, 480, 0)))
            .unwrap();
        project
            .grid
            .set_marker(RepeatMarker::new(1, RepeatKind::LoopStart))
            .unwrap();
        project
            .grid
            .set_marker(RepeatMarker::new(2, RepeatKind::RepeatEnd { count: 3 }))
            .unwrap();
        project
    }

    #[test]
    fn test_record_round_trip() {
        let project = sample_project();
        let restored = Project::from_record(project.to_record()).unwrap();
        assert_eq!(restored, project);
    }

    #[test]
    fn test_validate_record_valid() {
        assert!(validate_record(&sample_project().to_record()).is_ok());
    }

    #[test]
    fn test_validate_record_invalid_name() {
        let mut record = sample_project().to_record();
        record.metadata.name = "  ".to_string();
        let result = validate_record(&record);
        assert!(result.unwrap_err().to_string().contains("name cannot be empty"));
    }

    #[test]
    fn test_validate_record_invalid_tempo() {
        let mut record = sample_project().to_record();
        record.bpm = 10.0;
        assert!(
            validate_record(&record)
                .unwrap_err()
                .to_string()
                .contains("Tempo must be between")
        );
    }

    #[test]
    fn test_validate_record_slot_outside_grid() {
        let mut record = sample_project().to_record();
        record.slots[0].step = 16;
        assert!(
            validate_record(&record)
                .unwrap_err()
                .to_string()
                .contains("outside the grid")
        );
    }

    #[test]
    fn test_validate_record_duplicate_marker() {
        let mut record = sample_project().to_record();
        record
            .markers
            .push(RepeatMarker::new(1, RepeatKind::LoopStart));
        assert!(validate_record(&record).is_err());
    }

    #[test]
    fn test_validate_record_channel_count() {
        let mut record = sample_project().to_record();
        record.channels.pop();
        assert!(validate_record(&record).is_err());
    }

    #[test]
    fn test_validate_record_future_version() {
        let mut record = sample_project().to_record();
        record.metadata.version = ProjectVersion::new(2, 0, 0);
        assert!(matches!(
            validate_record(&record),
            Err(ProjectError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_validate_record_playback_settings() {
        let mut record = sample_project().to_record();
        record.master_volume = 128;
        assert!(validate_record(&record).is_err());

        let mut record = sample_project().to_record();
        record.end_bar = Some(0);
        assert!(validate_record(&record).is_err());
    }

    #[test]
    fn test_record_without_effects_gets_defaults() {
        let mut value = serde_json::to_value(sample_project().to_record()).unwrap();
        let record = value.as_object_mut().unwrap();
        record.remove("master_volume");
        record.remove("end_bar");
        for channel in record["channels"].as_array_mut().unwrap() {
            let channel = channel.as_object_mut().unwrap();
            channel.remove("reverb");
            channel.remove("chorus");
        }

        let project = Project::from_record(serde_json::from_value(value).unwrap()).unwrap();
        assert_eq!(project.master_volume, 127);
        assert_eq!(project.end_bar, None);
        assert!(project.channels.iter().all(|c| c.reverb == 0 && c.chorus == 0));
    }
}
