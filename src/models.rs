use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable integer id of an actor, shared by all five event kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fight within a report, as persisted in a dump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fight {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub friendly_players: Vec<ActorId>,
    #[serde(default, rename = "enemyNPCs")]
    pub enemy_npcs: Vec<NpcRef>,
    #[serde(default, rename = "friendlyNPCs")]
    pub friendly_npcs: Vec<NpcRef>,
}

impl Fight {
    pub fn new(id: i64, name: &str, start_time: i64, end_time: i64) -> Self {
        Fight {
            id,
            name: name.to_string(),
            start_time,
            end_time,
            ..Default::default()
        }
    }

    /// Fight length in ms. Negative when the descriptor is inverted.
    pub fn duration(&self) -> i64 {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcRef {
    pub id: ActorId,
}

/// An actor entry from the report roster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportActor {
    pub id: ActorId,
    #[serde(default)]
    pub name: String,
    /// "Player", "NPC", "Pet"
    #[serde(default, rename = "type")]
    pub actor_type: Option<String>,
    /// "Boss", "NPC", "Pet"
    #[serde(default)]
    pub sub_type: Option<String>,
    /// Combat role of a player ("tank", "healer", "dps")
    #[serde(default)]
    pub role: Option<String>,
}

/// A taunt debuff window on an enemy, in absolute timestamps. Active for `start <= t < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TauntInterval {
    #[serde(rename = "sourceID")]
    pub source_id: ActorId,
    #[serde(rename = "targetID")]
    pub target_id: ActorId,
    pub start: i64,
    pub end: i64,
}

/// Report data beside the event arrays that refines the reconstruction
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FightContext {
    #[serde(default)]
    pub actors: Vec<ReportActor>,
    #[serde(default)]
    pub taunts: Vec<TauntInterval>,
}

/// What an actor is in the fight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Player,
    Boss,
    Enemy,
    FriendlyNpc,
    Pet,
}

/// Resource snapshot attached to one side of an event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub facing: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hit_points: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_hit_points: Option<f64>,
}

impl Resources {
    pub fn at(x: f64, y: f64) -> Self {
        Resources {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn with_facing(mut self, facing: f64) -> Self {
        self.facing = Some(facing);
        self
    }

    pub fn with_health(mut self, current: f64, max: f64) -> Self {
        self.hit_points = Some(current);
        self.max_hit_points = Some(max);
        self
    }
}

/// Shape shared by damage, heal and resource-change records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatEvent {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "sourceID", deserialize_with = "lenient_actor")]
    pub source_id: Option<ActorId>,
    #[serde(default, rename = "targetID", deserialize_with = "lenient_actor")]
    pub target_id: Option<ActorId>,
    #[serde(default, rename = "abilityGameID", deserialize_with = "lenient_i64")]
    pub ability_game_id: Option<i64>,
    #[serde(default)]
    pub source_resources: Option<Resources>,
    #[serde(default)]
    pub target_resources: Option<Resources>,
}

impl CombatEvent {
    pub fn new(timestamp: i64, source: i64, target: i64) -> Self {
        CombatEvent {
            timestamp: Some(timestamp),
            source_id: Some(ActorId(source)),
            target_id: Some(ActorId(target)),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, resources: Resources) -> Self {
        self.source_resources = Some(resources);
        self
    }

    pub fn with_target(mut self, resources: Resources) -> Self {
        self.target_resources = Some(resources);
        self
    }
}

/// A death record. Carries no position.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeathEvent {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "sourceID", deserialize_with = "lenient_actor")]
    pub source_id: Option<ActorId>,
    #[serde(default, rename = "targetID", deserialize_with = "lenient_actor")]
    pub target_id: Option<ActorId>,
}

impl DeathEvent {
    pub fn new(timestamp: i64, target: i64) -> Self {
        DeathEvent {
            timestamp: Some(timestamp),
            source_id: None,
            target_id: Some(ActorId(target)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastEvent {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default, rename = "sourceID", deserialize_with = "lenient_actor")]
    pub source_id: Option<ActorId>,
    #[serde(default, rename = "targetID", deserialize_with = "lenient_actor")]
    pub target_id: Option<ActorId>,
    #[serde(default, rename = "abilityGameID", deserialize_with = "lenient_i64")]
    pub ability_game_id: Option<i64>,
}

impl CastEvent {
    pub fn new(timestamp: i64, source: i64, target: i64, ability: i64) -> Self {
        CastEvent {
            timestamp: Some(timestamp),
            source_id: Some(ActorId(source)),
            target_id: Some(ActorId(target)),
            ability_game_id: Some(ability),
        }
    }
}

/// The five event arrays of one fight
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FightEvents {
    #[serde(default)]
    pub damage: Vec<CombatEvent>,
    #[serde(default)]
    pub heal: Vec<CombatEvent>,
    #[serde(default)]
    pub death: Vec<DeathEvent>,
    #[serde(default)]
    pub resource: Vec<CombatEvent>,
    #[serde(default)]
    pub cast: Vec<CastEvent>,
}

impl FightEvents {
    pub fn len(&self) -> usize {
        self.damage.len() + self.heal.len() + self.death.len() + self.resource.len() + self.cast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All events as one tagged stream, in array order (damage, heal, death, resource, cast)
    pub fn iter(&self) -> impl Iterator<Item = RawEvent<'_>> {
        self.damage
            .iter()
            .map(RawEvent::Damage)
            .chain(self.heal.iter().map(RawEvent::Heal))
            .chain(self.death.iter().map(RawEvent::Death))
            .chain(self.resource.iter().map(RawEvent::ResourceChange))
            .chain(self.cast.iter().map(RawEvent::Cast))
    }
}

/// One raw event of any of the five kinds
#[derive(Debug, Clone, Copy)]
pub enum RawEvent<'a> {
    Damage(&'a CombatEvent),
    Heal(&'a CombatEvent),
    Death(&'a DeathEvent),
    ResourceChange(&'a CombatEvent),
    Cast(&'a CastEvent),
}

impl RawEvent<'_> {
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            RawEvent::Damage(e) | RawEvent::Heal(e) | RawEvent::ResourceChange(e) => e.timestamp,
            RawEvent::Death(e) => e.timestamp,
            RawEvent::Cast(e) => e.timestamp,
        }
    }
}

/// Scene coordinates, serialized as `[x, y, z]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position(pub f64, pub f64, pub f64);

impl Position {
    pub fn lerp(self, to: Position, progress: f64) -> Position {
        Position(
            self.0 + (to.0 - self.0) * progress,
            self.1 + (to.1 - self.1) * progress,
            self.2 + (to.2 - self.2) * progress,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Health {
    pub current: f64,
    pub max: f64,
    pub percentage: f64,
}

impl Health {
    pub fn new(current: f64, max: f64) -> Self {
        let percentage = if max > 0.0 { current / max * 100.0 } else { 0.0 };
        Health { current, max, percentage }
    }
}

/// State of one actor at one instant, relative to fight start
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub timestamp_relative: i64,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<Health>,
    pub is_dead: bool,
    /// Enemy under a taunt whose source is still alive
    pub is_taunted: bool,
}

/// Observed samples of one actor across the fight
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorTimeline {
    pub actor_id: ActorId,
    pub name: String,
    pub kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Strictly increasing by `timestamp_relative`
    pub positions: Vec<PositionSample>,
    /// Relative timestamps of every death marker, including those with no known position
    pub deaths: Vec<i64>,
}

impl ActorTimeline {
    pub fn first_timestamp(&self) -> Option<i64> {
        self.positions.first().map(|p| p.timestamp_relative)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.positions.last().map(|p| p.timestamp_relative)
    }
}

/// Every actor's state at one global timestamp
pub type Frame = BTreeMap<ActorId, PositionSample>;

// Anything that isn't a JSON number is treated as absent.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(value.and_then(|v| v.as_f64()).filter(|f| f.is_finite()))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(value.and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
    }))
}

fn lenient_actor<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ActorId>, D::Error> {
    Ok(lenient_i64(d)?.map(ActorId))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loosely_typed_event_with_unknown_fields() {
        let json = r#"{
            "timestamp": 1500,
            "type": "damage",
            "sourceID": 101,
            "targetID": 202,
            "abilityGameID": 12345,
            "amount": 1000,
            "hitType": 1,
            "sourceResources": { "x": "oops", "y": 5410, "facing": 100, "championPoints": 810 },
            "targetResources": { "x": 5240, "y": 5415, "hitPoints": 90, "maxHitPoints": 100 }
        }"#;
        let event: CombatEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.timestamp, Some(1500));
        assert_eq!(event.source_id, Some(ActorId(101)));
        let source = event.source_resources.unwrap();
        assert_eq!(source.x, None);
        assert_eq!(source.y, Some(5410.0));
        let target = event.target_resources.unwrap();
        assert_eq!(target.hit_points, Some(90.0));
    }

    #[test]
    fn non_numeric_timestamp_is_absent() {
        let event: DeathEvent = serde_json::from_str(r#"{"timestamp": "soon", "targetID": 7}"#).unwrap();
        assert_eq!(event.timestamp, None);
        assert_eq!(event.target_id, Some(ActorId(7)));
    }

    #[test]
    fn missing_event_arrays_default_to_empty() {
        let events: FightEvents = serde_json::from_str(r#"{"damage": []}"#).unwrap();
        assert!(events.is_empty());
        assert_eq!(events.iter().count(), 0);
    }

    #[test]
    fn fight_descriptor_uses_source_field_names() {
        let json = r#"{
            "id": 16, "name": "Lokkestiiz", "startTime": 1000, "endTime": 5000,
            "friendlyPlayers": [101, 102],
            "enemyNPCs": [{"id": 201, "gameID": 1}],
            "friendlyNPCs": [{"id": 301}],
            "kill": null
        }"#;
        let fight: Fight = serde_json::from_str(json).unwrap();
        assert_eq!(fight.duration(), 4000);
        assert_eq!(fight.enemy_npcs[0].id, ActorId(201));
        assert_eq!(fight.friendly_npcs[0].id, ActorId(301));
    }

    #[test]
    fn health_percentage_guards_zero_max() {
        assert_eq!(Health::new(50.0, 200.0).percentage, 25.0);
        assert_eq!(Health::new(50.0, 0.0).percentage, 0.0);
    }

    #[test]
    fn frame_serializes_with_actor_keys() {
        let mut frame = Frame::new();
        frame.insert(ActorId(7), PositionSample {
            timestamp_relative: 0,
            position: Position(1.0, 2.0, 0.0),
            facing: None,
            health: None,
            is_dead: false,
            is_taunted: false,
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["7"]["position"], serde_json::json!([1.0, 2.0, 0.0]));
        assert_eq!(json["7"]["isDead"], false);
        assert_eq!(json["7"]["isTaunted"], false);
    }

    #[test]
    fn roster_and_taunts_parse_from_report_fields() {
        let json = r#"{
            "actors": [{"id": 101, "name": "Tank", "type": "Player", "role": "tank", "icon": "x"}],
            "taunts": [{"sourceID": 101, "targetID": 201, "start": 1000, "end": 16000}]
        }"#;
        let context: FightContext = serde_json::from_str(json).unwrap();
        assert_eq!(context.actors[0].role.as_deref(), Some("tank"));
        assert_eq!(context.taunts[0].target_id, ActorId(201));
        assert_eq!(context.taunts[0].end, 16000);
        assert!(serde_json::from_str::<FightContext>("{}").unwrap().taunts.is_empty());
    }
}
