//! Player Store — TTL-backed cache of feature records, keyed by
//! `user:<level>:<playerId>`.
//!
//! The cache is best effort on both sides: a failed fetch degrades to an
//! empty history and a failed save is logged and swallowed. Neither ever
//! fails the analysis request. Entries are idempotent feature snapshots,
//! so concurrent writes to the same key resolve as last-write-wins.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::models::FeatureRecord;

/// Entry expiration: 7 days
pub const ENTRY_TTL_SECS: u64 = 604_800;

/// Cache key for one player's snapshot within a level.
pub fn cache_key(level: &str, player_id: &str) -> String {
    format!("user:{level}:{player_id}")
}

/// Values are stored as schema-checked JSON; anything that does not parse
/// back into a `FeatureRecord` is ignored on read.
fn decode_entry(raw: &str) -> Option<FeatureRecord> {
    serde_json::from_str(raw).ok()
}

/// Cache of per-player feature records, partitioned by skill level.
/// Object-safe so handlers and tests can inject doubles.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// All cached records for a level. Empty when nothing is cached or the
    /// store is unreachable.
    async fn fetch(&self, level: &str) -> Vec<FeatureRecord>;

    /// Upsert every record that carries a player id, with a 7-day expiry.
    /// Records without an id are skipped; failures are swallowed.
    async fn save(&self, level: &str, records: &[FeatureRecord]);
}

/// Redis-backed store. The connection manager is cheap to clone and safe
/// for concurrent use from multiple cohort tasks.
pub struct RedisPlayerStore {
    manager: ConnectionManager,
}

impl RedisPlayerStore {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    async fn fetch_level(&self, level: &str) -> Result<Vec<FeatureRecord>, redis::RedisError> {
        let mut con = self.manager.clone();
        let pattern = format!("user:{level}:*");

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter: redis::AsyncIter<String> = con.scan_match(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = con.mget(&keys).await?;
        Ok(values
            .into_iter()
            .flatten()
            .filter_map(|raw| decode_entry(&raw))
            .collect())
    }
}

#[async_trait]
impl PlayerStore for RedisPlayerStore {
    async fn fetch(&self, level: &str) -> Vec<FeatureRecord> {
        match self.fetch_level(level).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("Cache fetch failed for level {}: {}", level, err);
                Vec::new()
            }
        }
    }

    async fn save(&self, level: &str, records: &[FeatureRecord]) {
        let mut con = self.manager.clone();
        for record in records {
            let Some(player_id) = record.player_id.as_deref().filter(|id| !id.is_empty())
            else {
                continue;
            };
            let key = cache_key(level, player_id);
            let payload = match serde_json::to_string(record) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!("Cache encode failed for {}: {}", key, err);
                    continue;
                }
            };
            if let Err(err) = con.set_ex::<_, _, ()>(&key, payload, ENTRY_TTL_SECS).await {
                tracing::warn!("Cache save failed for {}: {}", key, err);
            }
        }
    }
}
