// Repeat signs - LOOP / SKIP / REPEAT control flow over bars

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a repeat sign does when playback reaches its bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatKind {
    /// Start of a repeated section
    LoopStart,
    /// Jump forward to `target` the first time the bar is entered
    Skip { target: usize },
    /// At the end of the bar, go back to the nearest LoopStart `count` times
    RepeatEnd { count: u32 },
}

impl RepeatKind {
    /// Sort rank for markers sharing a bar
    fn rank(&self) -> u8 {
        match self {
            RepeatKind::LoopStart => 0,
            RepeatKind::Skip { .. } => 1,
            RepeatKind::RepeatEnd { .. } => 2,
        }
    }

    pub fn same_variant(&self, other: &RepeatKind) -> bool {
        self.rank() == other.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatMarker {
    /// Bar index
    pub position: usize,
    pub kind: RepeatKind,
}

impl RepeatMarker {
    pub fn new(position: usize, kind: RepeatKind) -> Self {
        Self { position, kind }
    }

    pub(crate) fn sort_key(&self) -> (usize, u8) {
        (self.position, self.kind.rank())
    }
}

impl fmt::Display for RepeatMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RepeatKind::LoopStart => write!(f, "LOOP@{}", self.position),
            RepeatKind::Skip { target } => write!(f, "SKIP@{}->{}", self.position, target),
            RepeatKind::RepeatEnd { count } => write!(f, "REPEAT@{}x{}", self.position, count),
        }
    }
}

/// Referential problem with a repeat sign, treated as a no-op at playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridConsistencyWarning {
    /// RepeatEnd with no LoopStart at or before it
    UnmatchedRepeatEnd { position: usize },
    /// Skip whose target is not a later bar of the grid
    InvalidSkipTarget {
        position: usize,
        target: usize,
        bar_count: usize,
    },
}

impl fmt::Display for GridConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridConsistencyWarning::UnmatchedRepeatEnd { position } => write!(
                f,
                "repeat at bar {} has no loop start before it, ignored",
                position + 1
            ),
            GridConsistencyWarning::InvalidSkipTarget {
                position,
                target,
                bar_count,
            } => write!(
                f,
                "skip at bar {} targets bar {} (grid has {} bars), ignored",
                position + 1,
                target + 1,
                bar_count
            ),
        }
    }
}

/// Nearest LoopStart at or before `position`
pub fn matching_loop_start(markers: &[RepeatMarker], position: usize) -> Option<usize> {
    markers
        .iter()
        .filter(|m| m.kind == RepeatKind::LoopStart && m.position <= position)
        .map(|m| m.position)
        .max()
}

/// Every marker that playback would have to ignore
pub fn consistency_warnings(
    markers: &[RepeatMarker],
    bar_count: usize,
) -> Vec<GridConsistencyWarning> {
    markers
        .iter()
        .filter_map(|marker| match marker.kind {
            RepeatKind::RepeatEnd { .. } if matching_loop_start(markers, marker.position).is_none() => {
                Some(GridConsistencyWarning::UnmatchedRepeatEnd {
                    position: marker.position,
                })
            }
            RepeatKind::Skip { target } if target <= marker.position || target > bar_count => {
                Some(GridConsistencyWarning::InvalidSkipTarget {
                    position: marker.position,
                    target,
                    bar_count,
                })
            }
            _ => None,
        })
        .collect()
}

/// Repeat currently being unwound, as shown on the playback cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRepeat {
    /// Bar holding the RepeatEnd
    pub bar: usize,
    pub remaining: u32,
}

/// Outcome of reaching the end of a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarEnd {
    /// No RepeatEnd on this bar, or it was ignored
    Continue,
    /// Jump back to the start of `to_bar`
    Repeat { to_bar: usize, active: ActiveRepeat },
    /// Counter exhausted, playback falls through past the marker
    FallThrough { bar: usize },
}

/// Per-play counters for repeat signs
///
/// Counters are keyed by the bar holding the sign. A bar carries at most one
/// sign of each kind, so the bar identifies the sign even when other markers
/// are added or removed while paused. Bar inserts and deletes move the keys
/// the same way the grid moves its markers.
///
/// A RepeatEnd's counter is armed on first arrival and dropped when it
/// falls through, so an enclosing repeat re-arms it on the next pass.
/// Jumps only ever go back to a LoopStart at or before the RepeatEnd, and a
/// counter only re-arms after falling through, so playback always ends.
#[derive(Debug, Clone, Default)]
pub struct RepeatState {
    remaining: HashMap<usize, u32>,
    fired_skips: HashSet<usize>,
}

impl RepeatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.remaining.clear();
        self.fired_skips.clear();
    }

    /// Evaluate the RepeatEnd (if any) on `bar` as playback leaves it
    pub fn on_bar_end(
        &mut self,
        markers: &[RepeatMarker],
        bar: usize,
        warnings: &mut Vec<GridConsistencyWarning>,
    ) -> BarEnd {
        let Some(count) = markers.iter().find_map(|m| match m.kind {
            RepeatKind::RepeatEnd { count } if m.position == bar => Some(count),
            _ => None,
        }) else {
            return BarEnd::Continue;
        };

        let Some(loop_start) = matching_loop_start(markers, bar) else {
            warnings.push(GridConsistencyWarning::UnmatchedRepeatEnd { position: bar });
            return BarEnd::Continue;
        };

        let remaining = self.remaining.entry(bar).or_insert(count);
        if *remaining == 0 {
            self.remaining.remove(&bar);
            return BarEnd::FallThrough { bar };
        }

        *remaining -= 1;
        BarEnd::Repeat {
            to_bar: loop_start,
            active: ActiveRepeat {
                bar,
                remaining: *remaining,
            },
        }
    }

    /// Evaluate the Skip (if any) on `bar` when forward play enters it
    ///
    /// Returns the bar to jump to. Each Skip fires at most once per play.
    pub fn on_bar_enter(
        &mut self,
        markers: &[RepeatMarker],
        bar: usize,
        bar_count: usize,
        warnings: &mut Vec<GridConsistencyWarning>,
    ) -> Option<usize> {
        let target = markers.iter().find_map(|m| match m.kind {
            RepeatKind::Skip { target } if m.position == bar => Some(target),
            _ => None,
        })?;

        if self.fired_skips.contains(&bar) {
            return None;
        }
        if target <= bar || target > bar_count {
            warnings.push(GridConsistencyWarning::InvalidSkipTarget {
                position: bar,
                target,
                bar_count,
            });
            return None;
        }

        self.fired_skips.insert(bar);
        Some(target)
    }

    /// Follow a bar inserted at `at`
    pub fn insert_bar(&mut self, at: usize) {
        let shift = |bar: usize| if bar >= at { bar + 1 } else { bar };
        self.remaining = self.remaining.drain().map(|(bar, n)| (shift(bar), n)).collect();
        self.fired_skips = self.fired_skips.drain().map(shift).collect();
    }

    /// Follow the removal of bar `at`; counters on that bar are dropped
    pub fn delete_bar(&mut self, at: usize) {
        let shift = |bar: usize| match bar.cmp(&at) {
            std::cmp::Ordering::Less => Some(bar),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(bar - 1),
        };
        self.remaining = self
            .remaining
            .drain()
            .filter_map(|(bar, n)| shift(bar).map(|bar| (bar, n)))
            .collect();
        self.fired_skips = self.fired_skips.drain().filter_map(shift).collect();
    }
}
