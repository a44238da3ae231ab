// Project manager for loading and saving projects

use crate::project::serialization::*;
use crate::project::types::{Project, ProjectVersion};
use std::path::{Path, PathBuf};

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("Unsupported project format version {0}")]
    UnsupportedVersion(ProjectVersion),

    #[error("Unknown project file extension: {0}")]
    UnknownFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
}

/// On-disk encoding, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectFormat {
    Ron,
    Json,
}

impl ProjectFormat {
    pub fn from_path(path: &Path) -> Result<Self, ProjectError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "ron" => Ok(ProjectFormat::Ron),
            "json" => Ok(ProjectFormat::Json),
            _ => Err(ProjectError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// Saves and loads projects as single RON or JSON files
#[derive(Debug, Default)]
pub struct ProjectManager;

impl ProjectManager {
    pub fn new() -> Self {
        Self
    }

    /// Write a project, replacing any existing file only once the new
    /// content is fully on disk
    pub fn save<P: AsRef<Path>>(&self, project: &Project, path: P) -> Result<(), ProjectError> {
        let path = path.as_ref();
        let data = match ProjectFormat::from_path(path)? {
            ProjectFormat::Ron => serialize_to_ron(project)?,
            ProjectFormat::Json => serialize_to_json(project)?,
        };

        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }

        let temp = temp_path(path);
        std::fs::write(&temp, data)?;
        if let Err(e) = std::fs::rename(&temp, path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        tracing::info!("Project '{}' saved to {}", project.metadata.name, path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Project, ProjectError> {
        let path = path.as_ref();
        let format = ProjectFormat::from_path(path)?;
        let data = std::fs::read_to_string(path)?;
        let project = match format {
            ProjectFormat::Ron => deserialize_from_ron(&data)?,
            ProjectFormat::Json => deserialize_from_json(&data)?,
        };

        tracing::info!(
            "Project '{}' loaded from {} ({} notes)",
            project.metadata.name,
            path.display(),
            project.grid.note_count()
        );
        Ok(project)
    }

    /// Save with a refreshed modification time
    pub fn save_touched<P: AsRef<Path>>(
        &self,
        project: &mut Project,
        path: P,
    ) -> Result<(), ProjectError> {
        project.metadata.touch();
        self.save(project, path)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ProjectFormat::from_path(Path::new("a.ron")).unwrap(), ProjectFormat::Ron);
        assert_eq!(ProjectFormat::from_path(Path::new("b.JSON")).unwrap(), ProjectFormat::Json);
        assert!(matches!(
            ProjectFormat::from_path(Path::new("c.zip")),
            Err(ProjectError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_temp_path_sits_beside_target() {
        assert_eq!(temp_path(Path::new("/x/song.ron")), PathBuf::from("/x/song.ron.tmp"));
    }
}
