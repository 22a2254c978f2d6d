use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};

use crate::index::GlobalIndex;
use crate::models::*;

/// State between two consecutive samples `p0.t < t < p1.t`.
///
/// Position, facing and health are interpolated linearly; `is_dead` is discrete
/// and comes from `p0`.
pub fn interpolate(p0: &PositionSample, p1: &PositionSample, t: i64) -> PositionSample {
    let span = p1.timestamp_relative - p0.timestamp_relative;
    if span <= 0 {
        return PositionSample { timestamp_relative: t, ..*p0 };
    }
    let progress = ((t - p0.timestamp_relative) as f64 / span as f64).clamp(0.0, 1.0);

    let facing = match (p0.facing, p1.facing) {
        (Some(f0), Some(f1)) => {
            // shortest arc
            let delta = (f1 - f0 + PI).rem_euclid(TAU) - PI;
            Some(f0 + delta * progress)
        }
        (f0, _) => f0,
    };

    let health = match (p0.health, p1.health) {
        (Some(h0), Some(h1)) => Some(Health::new(
            h0.current + (h1.current - h0.current) * progress,
            h0.max + (h1.max - h0.max) * progress,
        )),
        (h0, h1) => h0.or(h1),
    };

    PositionSample {
        timestamp_relative: t,
        position: p0.position.lerp(p1.position, progress),
        facing,
        health,
        is_dead: p0.is_dead,
        is_taunted: p0.is_taunted,
    }
}

/// One actor's state at an arbitrary instant; `None` outside its observed range
pub fn state_at(timeline: &ActorTimeline, t: i64) -> Option<PositionSample> {
    let positions = &timeline.positions;
    // first sample strictly after t
    let after = positions.partition_point(|p| p.timestamp_relative <= t);
    let p0 = positions.get(after.checked_sub(1)?)?;
    if p0.timestamp_relative == t {
        return Some(*p0);
    }
    positions.get(after).map(|p1| interpolate(p0, p1, t))
}

/// Cross-actor state at every global timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTable {
    pub positions_by_timestamp: BTreeMap<i64, Frame>,
}

impl SnapshotTable {
    pub fn len(&self) -> usize {
        self.positions_by_timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions_by_timestamp.is_empty()
    }

    /// Frame stored at exactly `t`
    pub fn query(&self, t: i64) -> Option<&Frame> {
        self.positions_by_timestamp.get(&t)
    }

    /// Frame at the closest stored timestamp; ties resolve to the earlier one
    pub fn query_nearest(&self, t: i64) -> Option<(i64, &Frame)> {
        let before = self.positions_by_timestamp.range(..=t).next_back();
        let after = self.positions_by_timestamp.range(t..).next();
        let (ts, frame) = match (before, after) {
            (Some(b), Some(a)) => {
                if t - *b.0 <= *a.0 - t {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        Some((*ts, frame))
    }

    /// Frames with timestamps in `[from, to]`, in time order
    pub fn range(&self, from: i64, to: i64) -> impl Iterator<Item = (i64, &Frame)> {
        let bounds = if from <= to { Some(from..=to) } else { None };
        bounds
            .into_iter()
            .flat_map(move |r| self.positions_by_timestamp.range(r))
            .map(|(t, frame)| (*t, frame))
    }
}

/// Fill one frame per global timestamp.
///
/// Each actor walks only the slice of the index inside its own observed range,
/// advancing a cursor through its samples, so a timeline is traversed once.
pub fn build_snapshots<'a>(
    timelines: impl IntoIterator<Item = &'a ActorTimeline>,
    index: &GlobalIndex,
) -> SnapshotTable {
    let mut frames: Vec<Frame> = vec![Frame::new(); index.len()];

    for timeline in timelines {
        let positions = &timeline.positions;
        let (Some(first), Some(last)) = (timeline.first_timestamp(), timeline.last_timestamp()) else {
            continue;
        };

        let start = index.lower_bound(first);
        let mut cursor = 0;
        for (slot, &t) in frames[start..].iter_mut().zip(&index.sorted_timestamps[start..]) {
            if t > last {
                break;
            }
            while positions.get(cursor + 1).is_some_and(|next| next.timestamp_relative <= t) {
                cursor += 1;
            }
            let p0 = &positions[cursor];
            let sample = match positions.get(cursor + 1) {
                Some(p1) if p0.timestamp_relative != t => interpolate(p0, p1, t),
                _ => *p0,
            };
            slot.insert(timeline.actor_id, sample);
        }
    }

    SnapshotTable {
        positions_by_timestamp: index.sorted_timestamps.iter().copied().zip(frames).collect(),
    }
}
