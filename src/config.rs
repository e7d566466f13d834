//! Engine configuration.
//!
//! Mirrors the teacher's `dotenvy::dotenv().ok(); let config =
//! AppConfig::load()?;` bootstrap: a harness wiring up the engine reads
//! `.env` / process environment through the `config` crate and falls back
//! to sane defaults when nothing is set. The engine itself only ever sees
//! the resulting plain values (`construct(bucket_duration)` per
//! `spec.md` §6) — this module exists so that wiring isn't hand-rolled
//! ad hoc by every caller.

use serde::Deserialize;

const DEFAULT_BUCKET_DURATION_SECS: u64 = 900;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for constructing an [`crate::Engine`].
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_bucket_duration")]
    pub bucket_duration_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_bucket_duration() -> u64 {
    DEFAULT_BUCKET_DURATION_SECS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_duration_secs: DEFAULT_BUCKET_DURATION_SECS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `.env` (if present) and the process
    /// environment, with fields prefixed `AUCTION_` (e.g.
    /// `AUCTION_BUCKET_DURATION_SECS`), falling back to defaults for
    /// anything unset.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let raw = config::Config::builder()
            .set_default("bucket_duration_secs", DEFAULT_BUCKET_DURATION_SECS)?
            .set_default("event_channel_capacity", DEFAULT_EVENT_CHANNEL_CAPACITY as i64)?
            .add_source(config::Environment::with_prefix("AUCTION"))
            .build()?;

        Ok(raw.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_reference_duration() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.bucket_duration_secs, 900);
    }
}
