// Integration test for project persistence
// Save/load cycle through real files with realistic grid content

use tempfile::TempDir;
use unimidi_seq::project::{ProjectError, ProjectManager};
use unimidi_seq::sequencer::ClearScope;
use unimidi_seq::{
    Command, EngineConfig, MemoryTransport, Project, RepeatKind, RepeatMarker, SequencerGrid,
    SequencerSlot, Session, Tempo, TimeSignature,
};

fn demo_project() -> Project {
    let mut grid = SequencerGrid::new(4, 16, 8, TimeSignature::three_four(), 96);
    // Simple bass line on channel 1 and a kick on 9
    for bar in 0..4 {
        grid.set_slot(bar, 0, 0, Some(SequencerSlot::new(36, 110, 24, 9)))
            .unwrap();
        grid.set_slot(bar, 8, 1, Some(SequencerSlot::new(40 + bar as u8, 90, 48, 1)))
            .unwrap();
    }
    grid.set_marker(RepeatMarker::new(1, RepeatKind::LoopStart))
        .unwrap();
    grid.set_marker(RepeatMarker::new(2, RepeatKind::RepeatEnd { count: 3 }))
        .unwrap();
    grid.set_marker(RepeatMarker::new(0, RepeatKind::Skip { target: 1 }))
        .unwrap();

    let mut project = Project::new("Integration Test Project".to_string(), grid, Tempo::new(96.5));
    project.metadata.author = Some("Test User".to_string());
    project.channels[9].program = 0;
    project.channels[1].program = 33;
    project.channels[1].bank = 2;
    project.channels[1].volume_ratio = 0.75;
    project.channels[4].muted = true;
    project.channels[1].reverb = 48;
    project.channels[1].chorus = 16;
    project.master_volume = 110;
    project.end_bar = Some(3);
    project
}

#[test]
fn test_complete_project_persistence() {
    let dir = TempDir::new().unwrap();
    let manager = ProjectManager::new();
    let project = demo_project();

    for name in ["song.ron", "song.json"] {
        let path = dir.path().join(name);
        manager.save(&project, &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join(format!("{}.tmp", name)).exists());

        let loaded = manager.load(&path).unwrap();
        assert_eq!(loaded, project, "{} did not round trip", name);
        assert_eq!(loaded.grid.note_count(), 8);
        assert_eq!(loaded.grid.markers().len(), 3);
    }
}

#[test]
fn test_save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/deeper/song.ron");
    ProjectManager::new().save(&demo_project(), &path).unwrap();
    assert!(path.exists());
}

#[test]
fn test_corrupt_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let manager = ProjectManager::new();
    let path = dir.path().join("song.json");
    manager.save(&demo_project(), &path).unwrap();

    // Move a slot off the grid
    let text = std::fs::read_to_string(&path).unwrap();
    let broken = text.replacen("\"step\": 8", "\"step\": 99", 1);
    assert_ne!(text, broken);
    std::fs::write(&path, broken).unwrap();

    assert!(matches!(
        manager.load(&path),
        Err(ProjectError::InvalidStructure(_))
    ));
}

#[test]
fn test_unknown_extension_and_missing_file() {
    let dir = TempDir::new().unwrap();
    let manager = ProjectManager::new();
    assert!(matches!(
        manager.save(&demo_project(), dir.path().join("song.mid")),
        Err(ProjectError::UnknownFormat(_))
    ));
    assert!(matches!(
        manager.load(dir.path().join("missing.ron")),
        Err(ProjectError::Io(_))
    ));
}

#[test]
fn test_session_edits_survive_save_and_load() {
    let dir = TempDir::new().unwrap();
    let manager = ProjectManager::new();
    let path = dir.path().join("edited.ron");

    let (mut session, _handles) = Session::new(&EngineConfig::default(), MemoryTransport::new());
    session.load_project(demo_project());
    session
        .handle(Command::ClearChannel {
            channel: 9,
            scope: ClearScope::AllBars,
        })
        .unwrap();
    session.handle(Command::InsertBar(4)).unwrap();
    session.handle(Command::SetTempo(140.0)).unwrap();

    manager.save(session.project(), &path).unwrap();
    let loaded = manager.load(&path).unwrap();

    assert_eq!(loaded.grid.bar_count(), 5);
    assert_eq!(loaded.grid.note_count(), 4);
    assert_eq!(loaded.tempo.bpm(), 140.0);
    assert_eq!(loaded, *session.project());
}
