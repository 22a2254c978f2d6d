use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::config::RevivalPolicy;
use crate::models::*;
use crate::normalize::{NormalizedSample, PositionReading};

/// Everything observed for one actor, each list sorted by timestamp
#[derive(Debug, Clone, Default)]
pub struct ActorSamples {
    pub positions: Vec<PositionReading>,
    pub deaths: Vec<i64>,
    pub revives: Vec<i64>,
}

/// Split normalized samples per actor. Sorting is stable, so equal timestamps keep input order.
pub fn group_by_actor(samples: &[NormalizedSample]) -> BTreeMap<ActorId, ActorSamples> {
    let mut groups: BTreeMap<ActorId, ActorSamples> = BTreeMap::new();
    for sample in samples {
        let group = groups.entry(sample.actor()).or_default();
        match sample {
            NormalizedSample::Position(p) => group.positions.push(*p),
            NormalizedSample::Death(m) => group.deaths.push(m.timestamp),
            NormalizedSample::Revive(m) => group.revives.push(m.timestamp),
        }
    }
    for group in groups.values_mut() {
        group.positions.sort_by_key(|p| p.timestamp);
        group.deaths.sort_unstable();
        group.revives.sort_unstable();
    }
    groups
}

/// Every actor referenced as source or target by any event
pub fn participants(events: &FightEvents) -> BTreeSet<ActorId> {
    let mut ids = BTreeSet::new();
    for event in events.iter() {
        let (source, target) = match event {
            RawEvent::Damage(e) | RawEvent::Heal(e) | RawEvent::ResourceChange(e) => (e.source_id, e.target_id),
            RawEvent::Death(e) => (e.source_id, e.target_id),
            RawEvent::Cast(e) => (e.source_id, e.target_id),
        };
        ids.extend(source);
        ids.extend(target);
    }
    ids
}

/// Resolves display name and kind once per actor for a fight
pub struct ActorDirectory<'a> {
    roster: HashMap<ActorId, &'a ReportActor>,
    players: HashSet<ActorId>,
    friendly_npcs: HashSet<ActorId>,
}

impl<'a> ActorDirectory<'a> {
    pub fn new(fight: &Fight, roster: &'a [ReportActor]) -> Self {
        ActorDirectory {
            roster: roster.iter().map(|a| (a.id, a)).collect(),
            players: fight.friendly_players.iter().copied().collect(),
            friendly_npcs: fight.friendly_npcs.iter().map(|n| n.id).collect(),
        }
    }

    pub fn name(&self, id: ActorId) -> String {
        match self.roster.get(&id) {
            Some(actor) if !actor.name.is_empty() => actor.name.clone(),
            _ => format!("Actor {}", id),
        }
    }

    /// Roster role, reported for players only
    pub fn role(&self, id: ActorId) -> Option<String> {
        if !self.players.contains(&id) {
            return None;
        }
        self.roster.get(&id).and_then(|a| a.role.clone())
    }

    pub fn kind(&self, id: ActorId) -> ActorKind {
        if self.players.contains(&id) {
            return ActorKind::Player;
        }
        let entry = self.roster.get(&id);
        let typed = |t: &str, sub: &str| {
            entry.is_some_and(|a| a.actor_type.as_deref() == Some(t) && a.sub_type.as_deref() == Some(sub))
        };
        if typed("NPC", "Boss") {
            ActorKind::Boss
        } else if typed("Pet", "Pet") {
            ActorKind::Pet
        } else if self.friendly_npcs.contains(&id) {
            ActorKind::FriendlyNpc
        } else {
            ActorKind::Enemy
        }
    }
}

/// One step of the per-actor merge. Variant order is the tie-break at equal timestamps.
#[derive(Debug, Clone, Copy)]
enum Step<'a> {
    Position(&'a PositionReading),
    Death,
    Revive,
}

impl Step<'_> {
    fn rank(&self) -> u8 {
        match self {
            Step::Position(_) => 0,
            Step::Death => 1,
            Step::Revive => 2,
        }
    }
}

/// Accumulator threaded through the merge
#[derive(Debug, Default)]
struct MergeState {
    dead: bool,
    last_death: Option<i64>,
    last_known: Option<PositionSample>,
    positions: Vec<PositionSample>,
}

impl MergeState {
    /// Append, or replace the last entry when it shares the timestamp
    fn upsert(&mut self, sample: PositionSample) {
        match self.positions.last_mut() {
            Some(last) if last.timestamp_relative == sample.timestamp_relative => *last = sample,
            _ => self.positions.push(sample),
        }
        self.last_known = Some(sample);
    }

    fn carry_forward(&mut self, timestamp: i64) {
        if let Some(known) = self.last_known {
            self.upsert(PositionSample {
                timestamp_relative: timestamp,
                is_dead: self.dead,
                ..known
            });
        }
    }

    fn apply(mut self, (timestamp, step): (i64, Step<'_>), revival: &RevivalPolicy) -> Self {
        match step {
            Step::Position(reading) => {
                let revived_by_activity = matches!(revival, RevivalPolicy::Activity)
                    && self.dead
                    && self.last_death.is_some_and(|d| timestamp > d)
                    && reading.reports_alive();
                if revived_by_activity {
                    self.dead = false;
                }
                self.upsert(PositionSample {
                    timestamp_relative: timestamp,
                    position: reading.position,
                    facing: reading.facing,
                    health: reading.health,
                    is_dead: self.dead,
                    is_taunted: false,
                });
            }
            Step::Death => {
                self.dead = true;
                self.last_death = Some(timestamp);
                self.carry_forward(timestamp);
            }
            Step::Revive => {
                if self.dead {
                    self.dead = false;
                    self.carry_forward(timestamp);
                }
            }
        }
        self
    }
}

/// Merge one actor's readings and markers into an ordered, de-duplicated timeline.
///
/// Only observed samples are stored; interpolation happens at query time.
pub fn build_timeline(
    actor_id: ActorId,
    name: String,
    kind: ActorKind,
    samples: &ActorSamples,
    revival: &RevivalPolicy,
) -> ActorTimeline {
    let mut steps: Vec<(i64, Step<'_>)> = samples
        .positions
        .iter()
        .map(|p| (p.timestamp, Step::Position(p)))
        .chain(samples.deaths.iter().map(|&t| (t, Step::Death)))
        .chain(samples.revives.iter().map(|&t| (t, Step::Revive)))
        .collect();
    steps.sort_by_key(|(t, step)| (*t, step.rank()));

    let state = steps
        .into_iter()
        .fold(MergeState::default(), |state, step| state.apply(step, revival));

    let mut deaths = samples.deaths.clone();
    deaths.dedup();

    ActorTimeline {
        actor_id,
        name,
        kind,
        role: None,
        positions: state.positions,
        deaths,
    }
}

/// Build a timeline for every participant. Actors with nothing observed get an empty one.
pub fn build_timelines(
    participants: &BTreeSet<ActorId>,
    mut groups: BTreeMap<ActorId, ActorSamples>,
    directory: &ActorDirectory<'_>,
    revival: &RevivalPolicy,
) -> BTreeMap<ActorId, ActorTimeline> {
    let mut ids = participants.clone();
    ids.extend(groups.keys().copied());

    let jobs: Vec<Job> = ids
        .into_iter()
        .map(|id| Job {
            id,
            name: directory.name(id),
            kind: directory.kind(id),
            role: directory.role(id),
            samples: groups.remove(&id).unwrap_or_default(),
        })
        .collect();

    run_jobs(jobs, revival)
}

struct Job {
    id: ActorId,
    name: String,
    kind: ActorKind,
    role: Option<String>,
    samples: ActorSamples,
}

impl Job {
    fn run(self, revival: &RevivalPolicy) -> (ActorId, ActorTimeline) {
        let mut timeline = build_timeline(self.id, self.name, self.kind, &self.samples, revival);
        timeline.role = self.role;
        (self.id, timeline)
    }
}

#[cfg(not(feature = "parallel"))]
fn run_jobs(jobs: Vec<Job>, revival: &RevivalPolicy) -> BTreeMap<ActorId, ActorTimeline> {
    jobs.into_iter().map(|job| job.run(revival)).collect()
}

// Timelines are independent per actor; only this stage fans out.
#[cfg(feature = "parallel")]
fn run_jobs(jobs: Vec<Job>, revival: &RevivalPolicy) -> BTreeMap<ActorId, ActorTimeline> {
    use rayon::prelude::*;
    let built: Vec<(ActorId, ActorTimeline)> = jobs.into_par_iter().map(|job| job.run(revival)).collect();
    built.into_iter().collect()
}
