//! Engine options and server configuration.
//!
//! The server reads its configuration from environment variables; the engine
//! only sees [`EngineOptions`], which callers construct directly or take from
//! [`ServerConfig`].

use std::path::PathBuf;

use crate::error::Error;

const DEFAULT_DUMP_DIR: &str = "dumps";
const DEFAULT_PORT: u16 = 3000;
/// Raw game units per scene unit
pub const DEFAULT_COORDINATE_SCALE: f64 = 100.0;
/// Ability id of the resurrect cast in the combat-log format
pub const DEFAULT_RESURRECT_ABILITY: i64 = 26770;

/// Fixed scale-and-offset conversion from raw game units to scene coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    /// Third coordinate for every sample; the source format is 2D
    pub z: f64,
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        CoordinateTransform {
            scale: DEFAULT_COORDINATE_SCALE,
            offset_x: 0.0,
            offset_y: 0.0,
            z: 0.0,
        }
    }
}

impl CoordinateTransform {
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64, f64) {
        (x / self.scale + self.offset_x, y / self.scale + self.offset_y, self.z)
    }
}

/// How a dead actor comes back to life
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevivalPolicy {
    /// Only casts of these abilities onto the dead actor revive it
    ResurrectCast { ability_ids: Vec<i64> },
    /// A position sample after the latest death that reports positive health revives.
    /// For logs that carry no resurrect casts.
    Activity,
}

impl Default for RevivalPolicy {
    fn default() -> Self {
        RevivalPolicy::ResurrectCast {
            ability_ids: vec![DEFAULT_RESURRECT_ABILITY],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub transform: CoordinateTransform,
    pub revival: RevivalPolicy,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory scanned (recursively) for `*.json` fight dumps
    pub dump_dir: PathBuf,
    pub port: u16,
    pub engine: EngineOptions,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `FIGHTREPLAY_DUMP_DIR` -- dump directory (default `dumps`)
    /// - `FIGHTREPLAY_PORT` -- listen port (default 3000)
    /// - `FIGHTREPLAY_COORD_SCALE` -- raw units per scene unit (default 100)
    /// - `FIGHTREPLAY_REVIVAL` -- `resurrect` (default) or `activity`
    /// - `FIGHTREPLAY_RESURRECT_ABILITIES` -- comma-separated resurrect ability ids
    ///   (default 26770)
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let dump_dir = lookup("FIGHTREPLAY_DUMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DUMP_DIR));

        let port = match lookup("FIGHTREPLAY_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("invalid FIGHTREPLAY_PORT: {e}")))?,
            None => DEFAULT_PORT,
        };

        let mut transform = CoordinateTransform::default();
        if let Some(raw) = lookup("FIGHTREPLAY_COORD_SCALE") {
            let scale: f64 = raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid FIGHTREPLAY_COORD_SCALE: {e}")))?;
            if !scale.is_finite() || scale == 0.0 {
                return Err(Error::Config(format!("FIGHTREPLAY_COORD_SCALE must be non-zero, got {scale}")));
            }
            transform.scale = scale;
        }

        let ability_ids = match lookup("FIGHTREPLAY_RESURRECT_ABILITIES") {
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|part| {
                    part.trim().parse::<i64>().map_err(|e| {
                        Error::Config(format!("invalid ability id {:?} in FIGHTREPLAY_RESURRECT_ABILITIES: {e}", part))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => vec![DEFAULT_RESURRECT_ABILITY],
        };

        let revival = match lookup("FIGHTREPLAY_REVIVAL").as_deref().map(str::trim) {
            None | Some("") | Some("resurrect") => RevivalPolicy::ResurrectCast { ability_ids },
            Some("activity") => RevivalPolicy::Activity,
            Some(other) => {
                return Err(Error::Config(format!(
                    "FIGHTREPLAY_REVIVAL must be `resurrect` or `activity`, got {other:?}"
                )))
            }
        };

        Ok(ServerConfig {
            dump_dir,
            port,
            engine: EngineOptions { transform, revival },
        })
    }

    /// A CLI argument pointing at an existing directory overrides the configured dump dir
    pub fn with_cli_override(mut self, arg: Option<String>) -> Self {
        if let Some(arg) = arg {
            let p = PathBuf::from(&arg);
            if p.exists() {
                self.dump_dir = p;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.dump_dir, PathBuf::from("dumps"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.engine.transform.scale, 100.0);
        assert_eq!(
            config.engine.revival,
            RevivalPolicy::ResurrectCast { ability_ids: vec![DEFAULT_RESURRECT_ABILITY] }
        );
        assert_eq!(config.engine.revival, RevivalPolicy::default());
    }

    #[test]
    fn activity_heuristic_is_opt_in() {
        let config = ServerConfig::from_lookup(lookup_from(&[("FIGHTREPLAY_REVIVAL", "activity")])).unwrap();
        assert_eq!(config.engine.revival, RevivalPolicy::Activity);
    }

    #[test]
    fn resurrect_abilities_replace_default_ids() {
        let config = ServerConfig::from_lookup(lookup_from(&[("FIGHTREPLAY_RESURRECT_ABILITIES", "26770, 31247")])).unwrap();
        assert_eq!(
            config.engine.revival,
            RevivalPolicy::ResurrectCast { ability_ids: vec![26770, 31247] }
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ServerConfig::from_lookup(lookup_from(&[("FIGHTREPLAY_PORT", "http")])).is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[("FIGHTREPLAY_COORD_SCALE", "0")])).is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[("FIGHTREPLAY_RESURRECT_ABILITIES", "1,x")])).is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[("FIGHTREPLAY_REVIVAL", "never")])).is_err());
    }

    #[test]
    fn transform_scales_and_offsets() {
        let t = CoordinateTransform { scale: 100.0, offset_x: -52.35, offset_y: 0.0, z: 1.5 };
        let (x, y, z) = t.apply(5235.0, 5410.0);
        assert!(x.abs() < 1e-9);
        assert!((y - 54.10).abs() < 1e-9);
        assert_eq!(z, 1.5);
    }
}
