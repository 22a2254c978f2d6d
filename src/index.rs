use serde::Serialize;

use crate::models::ActorTimeline;

/// The shared playback time axis: every instant any actor was observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalIndex {
    /// Strictly increasing, relative to fight start
    pub sorted_timestamps: Vec<i64>,
}

impl GlobalIndex {
    pub fn len(&self) -> usize {
        self.sorted_timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted_timestamps.is_empty()
    }

    /// Position of the first timestamp `>= t`
    pub fn lower_bound(&self, t: i64) -> usize {
        self.sorted_timestamps.partition_point(|&ts| ts < t)
    }

    /// Closest timestamp to `t`; equidistant neighbours resolve to the earlier one
    pub fn nearest(&self, t: i64) -> Option<i64> {
        let i = self.lower_bound(t);
        let after = self.sorted_timestamps.get(i).copied();
        let before = i.checked_sub(1).and_then(|j| self.sorted_timestamps.get(j)).copied();
        match (before, after) {
            (Some(b), Some(a)) => Some(if t - b <= a - t { b } else { a }),
            (b, a) => b.or(a),
        }
    }

    /// Timestamps in `[from, to]`
    pub fn range(&self, from: i64, to: i64) -> &[i64] {
        if from > to {
            return &[];
        }
        let start = self.lower_bound(from);
        let end = self.sorted_timestamps.partition_point(|&ts| ts <= to);
        &self.sorted_timestamps[start..end]
    }
}

/// Union of every timeline's sample and death timestamps: one concatenation, one sort, one dedup.
///
/// Deaths are included so a death with no known position still marks a state change.
pub fn build_index<'a>(timelines: impl IntoIterator<Item = &'a ActorTimeline>) -> GlobalIndex {
    let mut sorted_timestamps: Vec<i64> = timelines
        .into_iter()
        .flat_map(|t| t.positions.iter().map(|p| p.timestamp_relative).chain(t.deaths.iter().copied()))
        .collect();
    sorted_timestamps.sort_unstable();
    sorted_timestamps.dedup();
    GlobalIndex { sorted_timestamps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn timeline(id: i64, stamps: &[i64]) -> ActorTimeline {
        ActorTimeline {
            actor_id: ActorId(id),
            name: format!("Actor {id}"),
            kind: ActorKind::Enemy,
            role: None,
            positions: stamps
                .iter()
                .map(|&t| PositionSample {
                    timestamp_relative: t,
                    position: Position::default(),
                    facing: None,
                    health: None,
                    is_dead: false,
                    is_taunted: false,
                })
                .collect(),
            deaths: vec![],
        }
    }

    #[test]
    fn merges_and_dedups_across_actors() {
        let timelines = [timeline(1, &[0, 500, 1000]), timeline(2, &[250, 500, 1500]), timeline(3, &[])];
        let index = build_index(&timelines);
        assert_eq!(index.sorted_timestamps, vec![0, 250, 500, 1000, 1500]);
    }

    #[test]
    fn death_markers_without_positions_still_mark_the_axis() {
        let mut t = timeline(1, &[]);
        t.deaths.push(300);
        assert_eq!(build_index([&t]).sorted_timestamps, vec![300]);

        let mut carried = timeline(2, &[0, 300]);
        carried.deaths.push(300);
        assert_eq!(build_index([&t, &carried]).sorted_timestamps, vec![0, 300]);
    }

    #[test]
    fn nearest_prefers_earlier_on_tie() {
        let index = GlobalIndex { sorted_timestamps: vec![0, 100, 300] };
        assert_eq!(index.nearest(50), Some(0));
        assert_eq!(index.nearest(51), Some(100));
        assert_eq!(index.nearest(-40), Some(0));
        assert_eq!(index.nearest(9000), Some(300));
        assert_eq!(index.nearest(100), Some(100));
        assert_eq!(GlobalIndex::default().nearest(5), None);
    }

    #[test]
    fn range_is_inclusive() {
        let index = GlobalIndex { sorted_timestamps: vec![0, 100, 200, 300] };
        assert_eq!(index.range(100, 200), &[100, 200]);
        assert_eq!(index.range(101, 199), &[] as &[i64]);
        assert_eq!(index.range(300, 100), &[] as &[i64]);
    }
}
