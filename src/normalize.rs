use tracing::debug;

use crate::config::{EngineOptions, RevivalPolicy};
use crate::models::*;

/// Which event kind a position reading was piggybacked on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    Damage,
    Heal,
    ResourceChange,
}

/// A position (plus vitals when present) reported for one actor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub actor: ActorId,
    /// Relative to fight start
    pub timestamp: i64,
    pub position: Position,
    pub facing: Option<f64>,
    pub health: Option<Health>,
    pub source: SampleSource,
}

impl PositionReading {
    /// Positive hit points mean the actor is up and fighting
    pub fn reports_alive(&self) -> bool {
        self.health.is_some_and(|h| h.current > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub actor: ActorId,
    /// Relative to fight start
    pub timestamp: i64,
}

/// Canonical per-actor observation extracted from a raw event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormalizedSample {
    Position(PositionReading),
    Death(Marker),
    Revive(Marker),
}

impl NormalizedSample {
    pub fn actor(&self) -> ActorId {
        match self {
            NormalizedSample::Position(p) => p.actor,
            NormalizedSample::Death(m) | NormalizedSample::Revive(m) => m.actor,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            NormalizedSample::Position(p) => p.timestamp,
            NormalizedSample::Death(m) | NormalizedSample::Revive(m) => m.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub events: usize,
    pub positions: usize,
    pub deaths: usize,
    pub revives: usize,
    /// Events without a usable timestamp
    pub dropped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub samples: Vec<NormalizedSample>,
    pub stats: NormalizeStats,
}

/// Extract every position reading and death/revive marker from the five event arrays.
///
/// Samples come out in input order (damage, heal, death, resource, cast; source
/// side before target side). Events that carry no position are normal and simply
/// contribute nothing.
pub fn normalize(fight: &Fight, events: &FightEvents, options: &EngineOptions) -> Normalized {
    let mut out = Normalized::default();

    for event in events.iter() {
        out.stats.events += 1;

        let Some(raw_ts) = event.timestamp() else {
            out.stats.dropped += 1;
            continue;
        };
        let timestamp = raw_ts - fight.start_time;

        match event {
            RawEvent::Damage(e) => push_sides(&mut out, e, timestamp, SampleSource::Damage, options),
            RawEvent::Heal(e) => push_sides(&mut out, e, timestamp, SampleSource::Heal, options),
            RawEvent::ResourceChange(e) => {
                push_sides(&mut out, e, timestamp, SampleSource::ResourceChange, options)
            }
            RawEvent::Death(e) => {
                if let Some(actor) = e.target_id {
                    out.samples.push(NormalizedSample::Death(Marker { actor, timestamp }));
                    out.stats.deaths += 1;
                }
            }
            RawEvent::Cast(e) => {
                if let RevivalPolicy::ResurrectCast { ability_ids } = &options.revival {
                    let is_resurrect = e.ability_game_id.is_some_and(|id| ability_ids.contains(&id));
                    if let (true, Some(actor)) = (is_resurrect, e.target_id) {
                        out.samples.push(NormalizedSample::Revive(Marker { actor, timestamp }));
                        out.stats.revives += 1;
                    }
                }
            }
        }
    }

    debug!(
        events = out.stats.events,
        positions = out.stats.positions,
        deaths = out.stats.deaths,
        revives = out.stats.revives,
        dropped = out.stats.dropped,
        "Normalized fight events"
    );
    out
}

fn push_sides(
    out: &mut Normalized,
    event: &CombatEvent,
    timestamp: i64,
    source: SampleSource,
    options: &EngineOptions,
) {
    let sides = [
        (event.source_id, event.source_resources.as_ref()),
        (event.target_id, event.target_resources.as_ref()),
    ];
    for (actor, resources) in sides {
        let (Some(actor), Some(resources)) = (actor, resources) else {
            continue;
        };
        if let Some(reading) = read_position(actor, resources, timestamp, source, options) {
            out.samples.push(NormalizedSample::Position(reading));
            out.stats.positions += 1;
        }
    }
}

fn read_position(
    actor: ActorId,
    resources: &Resources,
    timestamp: i64,
    source: SampleSource,
    options: &EngineOptions,
) -> Option<PositionReading> {
    let (x, y) = (resources.x?, resources.y?);
    let (sx, sy, sz) = options.transform.apply(x, y);
    let health = match (resources.hit_points, resources.max_hit_points) {
        (Some(current), Some(max)) => Some(Health::new(current, max)),
        _ => None,
    };
    Some(PositionReading {
        actor,
        timestamp,
        position: Position(sx, sy, sz),
        facing: resources.facing,
        health,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fight() -> Fight {
        Fight::new(1, "Test", 1000, 5000)
    }

    #[test]
    fn emits_independent_source_and_target_samples() {
        let mut events = FightEvents::default();
        events.damage.push(
            CombatEvent::new(1500, 101, 202)
                .with_source(Resources::at(5235.0, 5410.0).with_facing(100.0))
                .with_target(Resources::at(5240.0, 5415.0).with_health(90.0, 100.0)),
        );

        let out = normalize(&fight(), &events, &EngineOptions::default());

        assert_eq!(out.samples.len(), 2);
        let NormalizedSample::Position(source) = out.samples[0] else { panic!("expected position") };
        assert_eq!(source.actor, ActorId(101));
        assert_eq!(source.timestamp, 500);
        assert!((source.position.0 - 52.35).abs() < 1e-9);
        assert!((source.position.1 - 54.10).abs() < 1e-9);
        assert_eq!(source.facing, Some(100.0));
        assert_eq!(source.health, None);

        let NormalizedSample::Position(target) = out.samples[1] else { panic!("expected position") };
        assert_eq!(target.actor, ActorId(202));
        assert_eq!(target.health.map(|h| h.percentage), Some(90.0));
        assert_eq!(target.source, SampleSource::Damage);
    }

    #[test]
    fn events_without_positions_contribute_nothing() {
        let mut events = FightEvents::default();
        events.resource.push(CombatEvent::new(3000, 7, 7));
        events.heal.push(CombatEvent::new(3100, 7, 8).with_target(Resources {
            x: None,
            y: Some(10.0),
            ..Default::default()
        }));
        events.damage.push(CombatEvent {
            target_id: None,
            ..CombatEvent::new(3200, 7, 8).with_target(Resources::at(1.0, 1.0))
        });

        let out = normalize(&fight(), &events, &EngineOptions::default());

        assert!(out.samples.is_empty());
        assert_eq!(out.stats.events, 3);
        assert_eq!(out.stats.dropped, 0);
    }

    #[test]
    fn death_emits_marker_and_drops_untimed_events() {
        let mut events = FightEvents::default();
        events.death.push(DeathEvent::new(2000, 7));
        events.death.push(DeathEvent { timestamp: None, ..DeathEvent::new(0, 8) });
        events.death.push(DeathEvent { target_id: None, ..DeathEvent::new(2100, 0) });

        let out = normalize(&fight(), &events, &EngineOptions::default());

        assert_eq!(out.samples, vec![NormalizedSample::Death(Marker { actor: ActorId(7), timestamp: 1000 })]);
        assert_eq!(out.stats.dropped, 1);
    }

    #[test]
    fn resurrect_casts_emit_revive_markers() {
        let mut events = FightEvents::default();
        events.cast.push(CastEvent::new(2500, 101, 102, 26770));
        events.cast.push(CastEvent::new(2600, 101, 102, 1));
        events.cast.push(CastEvent { target_id: None, ..CastEvent::new(2700, 101, 0, 26770) });

        let out = normalize(&fight(), &events, &EngineOptions::default());
        assert_eq!(
            out.samples,
            vec![NormalizedSample::Revive(Marker { actor: ActorId(102), timestamp: 1500 })]
        );
        assert_eq!(out.stats.revives, 1);

        let activity = EngineOptions {
            revival: RevivalPolicy::Activity,
            ..Default::default()
        };
        assert!(normalize(&fight(), &events, &activity).samples.is_empty());
    }

    #[test]
    fn relative_timestamps_may_fall_outside_the_fight() {
        let mut events = FightEvents::default();
        events.damage.push(CombatEvent::new(500, 1, 2).with_source(Resources::at(0.0, 0.0)));

        let out = normalize(&fight(), &events, &EngineOptions::default());
        assert_eq!(out.samples[0].timestamp(), -500);
    }
}
