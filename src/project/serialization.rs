// Serialization utilities for project persistence

use crate::project::ProjectError;
use crate::project::types::{Project, ProjectRecord};
use ron::ser::PrettyConfig;

/// Serialize a project to pretty RON
pub fn serialize_to_ron(project: &Project) -> Result<String, ProjectError> {
    let config = PrettyConfig::new().depth_limit(4).struct_names(false);
    Ok(ron::ser::to_string_pretty(&project.to_record(), config)?)
}

/// Deserialize and validate a project from RON
pub fn deserialize_from_ron(data: &str) -> Result<Project, ProjectError> {
    let record: ProjectRecord = ron::from_str(data)?;
    Project::from_record(record)
}

/// Serialize a project to pretty JSON
pub fn serialize_to_json(project: &Project) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(&project.to_record())?)
}

/// Deserialize and validate a project from JSON
pub fn deserialize_from_json(data: &str) -> Result<Project, ProjectError> {
    let record: ProjectRecord = serde_json::from_str(data)?;
    Project::from_record(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::repeat::{RepeatKind, RepeatMarker};
    use crate::sequencer::slot::SequencerSlot;

    fn project() -> Project {
        let mut project = Project::default();
        project
            .grid
            .set_slot(2, 5, 1, Some(SequencerSlot::new(61, 77, 90, 3)))
            .unwrap();
        project
            .grid
            .set_marker(RepeatMarker::new(0, RepeatKind::Skip { target: 2 }))
            .unwrap();
        project.channels[3].volume_ratio = 0.3;
        project
    }

    #[test]
    fn test_ron_round_trip() {
        let project = project();
        let ron_data = serialize_to_ron(&project).unwrap();
        assert!(ron_data.contains("volume_ratio"));
        assert_eq!(deserialize_from_ron(&ron_data).unwrap(), project);
    }

    #[test]
    fn test_json_round_trip() {
        let project = project();
        let json = serialize_to_json(&project).unwrap();
        assert_eq!(deserialize_from_json(&json).unwrap(), project);
    }

    #[test]
    fn test_invalid_ron_is_an_error() {
        assert!(matches!(
            deserialize_from_ron("(metadata: oops"),
            Err(ProjectError::RonParse(_))
        ));
    }
}
