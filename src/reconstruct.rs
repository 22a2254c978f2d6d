use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EngineOptions;
use crate::index::{build_index, GlobalIndex};
use crate::models::*;
use crate::normalize::{normalize, NormalizeStats};
use crate::snapshot::{build_snapshots, state_at, SnapshotTable};
use crate::taunt::TauntLookup;
use crate::timeline::{build_timelines, group_by_actor, participants, ActorDirectory};

/// Everything rebuilt for one fight. Immutable once built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconstruction {
    pub fight_id: i64,
    pub fight_start_time: i64,
    pub fight_duration: i64,
    pub timelines: BTreeMap<ActorId, ActorTimeline>,
    pub index: GlobalIndex,
    pub snapshots: SnapshotTable,
    #[serde(skip)]
    pub stats: NormalizeStats,
    #[serde(skip)]
    taunts: TauntLookup,
}

/// Rebuild every actor's state for one fight with default options and no roster
pub fn reconstruct(fight: &Fight, events: &FightEvents) -> Reconstruction {
    reconstruct_with(fight, events, &FightContext::default(), &EngineOptions::default())
}

/// Rebuild every actor's state for one fight.
///
/// Pure and synchronous: no I/O, nothing shared between calls. An empty event
/// set yields an empty result rather than an error.
pub fn reconstruct_with(
    fight: &Fight,
    events: &FightEvents,
    context: &FightContext,
    options: &EngineOptions,
) -> Reconstruction {
    let normalized = normalize(fight, events, options);
    let directory = ActorDirectory::new(fight, &context.actors);
    let timelines = build_timelines(
        &participants(events),
        group_by_actor(&normalized.samples),
        &directory,
        &options.revival,
    );
    let index = build_index(timelines.values());
    let mut snapshots = build_snapshots(timelines.values(), &index);
    let taunts = TauntLookup::new(&context.taunts, fight.start_time);
    taunts.apply(&mut snapshots, &timelines);

    debug!(
        fight = fight.id,
        actors = timelines.len(),
        timestamps = index.len(),
        "Reconstructed fight"
    );

    Reconstruction {
        fight_id: fight.id,
        fight_start_time: fight.start_time,
        fight_duration: fight.duration(),
        timelines,
        index,
        snapshots,
        stats: normalized.stats,
        taunts,
    }
}

impl Reconstruction {
    /// Every actor's state at `t`: the stored frame when `t` is on the index,
    /// otherwise computed on demand from the timelines.
    pub fn query(&self, t: i64) -> Cow<'_, Frame> {
        match self.snapshots.query(t) {
            Some(frame) => Cow::Borrowed(frame),
            None => Cow::Owned(
                self.timelines
                    .keys()
                    .filter_map(|&id| self.actor_at(id, t).map(|s| (id, s)))
                    .collect(),
            ),
        }
    }

    /// Stored frame at the global timestamp closest to `t`
    pub fn query_nearest(&self, t: i64) -> Option<(i64, &Frame)> {
        self.snapshots.query_nearest(t)
    }

    pub fn actor_at(&self, actor: ActorId, t: i64) -> Option<PositionSample> {
        let mut sample = state_at(self.timelines.get(&actor)?, t)?;
        self.taunts.mark(actor, &mut sample, t, &self.timelines);
        Some(sample)
    }

    /// One actor's stored state at the global timestamp closest to `t`;
    /// `None` when the actor is absent from that frame
    pub fn actor_nearest(&self, actor: ActorId, t: i64) -> Option<(i64, PositionSample)> {
        let (ts, frame) = self.query_nearest(t)?;
        frame.get(&actor).map(|sample| (ts, *sample))
    }

    /// Stored frames within `radius` ms of `center`
    pub fn window(&self, center: i64, radius: i64) -> Vec<(i64, &Frame)> {
        let radius = radius.max(0);
        self.snapshots
            .range(center.saturating_sub(radius), center.saturating_add(radius))
            .collect()
    }

    /// Every death marker as `(actor, relative timestamp)`, in time order
    pub fn deaths(&self) -> Vec<(ActorId, i64)> {
        let mut deaths: Vec<(ActorId, i64)> = self
            .timelines
            .values()
            .flat_map(|t| t.deaths.iter().map(move |&d| (t.actor_id, d)))
            .collect();
        deaths.sort_by_key(|&(actor, t)| (t, actor));
        deaths
    }
}
