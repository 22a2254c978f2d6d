use std::collections::{BTreeMap, HashMap};

use crate::models::*;
use crate::snapshot::SnapshotTable;

/// Taunt windows grouped by target, relative to fight start and sorted by start
#[derive(Debug, Clone, Default)]
pub struct TauntLookup {
    by_target: HashMap<ActorId, Vec<TauntInterval>>,
}

impl TauntLookup {
    pub fn new(intervals: &[TauntInterval], fight_start: i64) -> Self {
        let mut by_target: HashMap<ActorId, Vec<TauntInterval>> = HashMap::new();
        for interval in intervals.iter().filter(|i| i.end > i.start) {
            by_target.entry(interval.target_id).or_default().push(TauntInterval {
                start: interval.start - fight_start,
                end: interval.end - fight_start,
                ..*interval
            });
        }
        for windows in by_target.values_mut() {
            windows.sort_by_key(|i| (i.start, i.end));
        }
        TauntLookup { by_target }
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Whether `target` is held by a taunt at `t`. Only enemies and bosses can be taunted,
    /// and a taunt whose source is dead at `t` no longer holds.
    pub fn is_taunted(&self, target: &ActorTimeline, t: i64, timelines: &BTreeMap<ActorId, ActorTimeline>) -> bool {
        if !matches!(target.kind, ActorKind::Enemy | ActorKind::Boss) {
            return false;
        }
        let Some(windows) = self.by_target.get(&target.actor_id) else {
            return false;
        };
        // earliest-starting window that covers t
        let candidates = &windows[..windows.partition_point(|i| i.start <= t)];
        let Some(active) = candidates.iter().find(|i| t < i.end) else {
            return false;
        };
        !timelines.get(&active.source_id).is_some_and(|source| is_dead_at(source, t))
    }

    pub fn mark(
        &self,
        actor: ActorId,
        sample: &mut PositionSample,
        t: i64,
        timelines: &BTreeMap<ActorId, ActorTimeline>,
    ) {
        if let Some(timeline) = timelines.get(&actor) {
            sample.is_taunted = self.is_taunted(timeline, t, timelines);
        }
    }

    /// Set `is_taunted` on every sample of every frame
    pub fn apply(&self, table: &mut SnapshotTable, timelines: &BTreeMap<ActorId, ActorTimeline>) {
        if self.is_empty() {
            return;
        }
        for (&t, frame) in table.positions_by_timestamp.iter_mut() {
            for (&actor, sample) in frame.iter_mut() {
                self.mark(actor, sample, t, timelines);
            }
        }
    }
}

/// Dead/alive state of an actor at `t` from its latest sample or death marker at or before `t`
pub fn is_dead_at(timeline: &ActorTimeline, t: i64) -> bool {
    let positions = &timeline.positions;
    let sample = positions[..positions.partition_point(|p| p.timestamp_relative <= t)].last();
    let death = timeline.deaths[..timeline.deaths.partition_point(|&d| d <= t)].last();
    match (sample, death) {
        (Some(p), Some(&d)) if d > p.timestamp_relative => true,
        (Some(p), _) => p.is_dead,
        (None, death) => death.is_some(),
    }
}
