// Randomized grid editing: structure edits must keep slots and repeat signs consistent

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use unimidi_seq::sequencer::ClearScope;
use unimidi_seq::{RepeatKind, RepeatMarker, SequencerGrid, SequencerSlot, TimeSignature};

fn populated_grid(rng: &mut StdRng) -> SequencerGrid {
    let mut grid = SequencerGrid::new(8, 16, 4, TimeSignature::four_four(), 480);
    for _ in 0..40 {
        let slot = SequencerSlot::new(
            rng.gen_range(24..=96),
            rng.gen_range(1..=127),
            rng.gen_range(1..=480),
            rng.gen_range(0..16),
        );
        let _ = grid.set_slot(
            rng.gen_range(0..8),
            rng.gen_range(0..16),
            rng.gen_range(0..4),
            Some(slot),
        );
    }
    grid
}

fn assert_markers_sane(grid: &SequencerGrid) {
    let markers = grid.markers();
    for marker in markers {
        assert!(marker.position < grid.bar_count(), "{} outside grid", marker);
    }
    // Sorted by bar, no duplicate kinds on a bar
    for pair in markers.windows(2) {
        assert!(pair[0].position <= pair[1].position);
        if pair[0].position == pair[1].position {
            assert!(!pair[0].kind.same_variant(&pair[1].kind));
        }
    }
}

/// Expected markers after inserting a bar at `at`
fn shift_for_insert(markers: &mut [RepeatMarker], at: usize) {
    for marker in markers {
        if marker.position >= at {
            marker.position += 1;
        }
        if let RepeatKind::Skip { target } = &mut marker.kind
            && *target >= at
        {
            *target += 1;
        }
    }
}

/// Expected markers after deleting bar `at`
fn shift_for_delete(markers: &mut Vec<RepeatMarker>, at: usize) {
    markers.retain(|m| m.position != at);
    for marker in markers {
        if marker.position > at {
            marker.position -= 1;
        }
        if let RepeatKind::Skip { target } = &mut marker.kind
            && *target > at
        {
            *target -= 1;
        }
    }
}

#[test]
fn test_random_insert_delete_keeps_notes_and_markers_consistent() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let mut grid = populated_grid(&mut rng);
        grid.set_marker(RepeatMarker::new(1, RepeatKind::LoopStart))
            .unwrap();
        grid.set_marker(RepeatMarker::new(2, RepeatKind::Skip { target: 5 }))
            .unwrap();
        grid.set_marker(RepeatMarker::new(4, RepeatKind::RepeatEnd { count: 1 }))
            .unwrap();
        let mut expected = grid.markers().to_vec();

        for _ in 0..20 {
            let notes_before = grid.note_count();
            if rng.gen_bool(0.5) {
                let at = rng.gen_range(0..=grid.bar_count());
                grid.insert_bar(at).unwrap();
                shift_for_insert(&mut expected, at);
                assert_eq!(grid.note_count(), notes_before);
            } else if grid.bar_count() > 1 {
                let at = rng.gen_range(0..grid.bar_count());
                let in_bar = (0..grid.steps_per_bar())
                    .map(|step| grid.slots_at(at, step).count())
                    .sum::<usize>();
                let removed = grid.delete_bar(at).unwrap();
                assert!(removed.iter().all(|m| m.position == at));
                shift_for_delete(&mut expected, at);
                assert_eq!(grid.note_count(), notes_before - in_bar);
            }
            assert_eq!(grid.markers(), expected.as_slice());
            assert_markers_sane(&grid);
        }
    }
}

#[test]
fn test_skip_target_follows_inserted_bars() {
    let mut grid = SequencerGrid::default();
    grid.set_marker(RepeatMarker::new(0, RepeatKind::Skip { target: 3 }))
        .unwrap();

    grid.insert_bar(2).unwrap();
    assert_eq!(grid.markers()[0].kind, RepeatKind::Skip { target: 4 });

    grid.insert_bar(0).unwrap();
    assert_eq!(
        grid.markers()[0],
        RepeatMarker::new(1, RepeatKind::Skip { target: 5 })
    );
}

#[test]
fn test_resolution_round_trip_never_gains_notes() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let mut grid = populated_grid(&mut rng);
        let original = grid.note_count();

        let coarse = grid.set_steps_per_bar(4).unwrap();
        assert_eq!(grid.note_count(), original - coarse.dropped);

        let fine = grid.set_steps_per_bar(16).unwrap();
        assert_eq!(fine.dropped, 0);
        assert_eq!(grid.note_count(), original - coarse.dropped);
    }
}

#[test]
fn test_clear_channel_touches_only_that_channel() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut grid = populated_grid(&mut rng);
    let channel_notes = |grid: &SequencerGrid, channel: u8| {
        grid.filled_slots()
            .filter(|(_, slot)| slot.channel == channel)
            .count()
    };

    let total = grid.note_count();
    let on_five = channel_notes(&grid, 5);
    assert_eq!(grid.clear_channel(5, ClearScope::AllBars).unwrap(), on_five);
    assert_eq!(channel_notes(&grid, 5), 0);
    assert_eq!(grid.note_count(), total - on_five);
}
