//! Redis Snapshot Cache
//!
//! Distributed adapter for the snapshot cache contract: a versioned JSON
//! payload with TTL, a version counter and a refresh lock released via
//! compare-and-delete. Every operation is total; Redis outages degrade
//! to misses.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::application::services::SnapshotCache;
use crate::domain::value_objects::{FaceEmbedding, FaceProfileSnapshot};

/// Key of the serialized snapshot payload.
const PAYLOAD_KEY: &str = "face:snapshot:payload";

/// Key of the monotonic snapshot version counter.
const VERSION_KEY: &str = "face:snapshot:version";

/// Key of the refresh leader lock.
const LOCK_KEY: &str = "face:snapshot:refresh_lock";

/// Remaining payload lifetime after an invalidation (seconds).
const INVALIDATED_PAYLOAD_TTL_SECS: i64 = 5;

/// Compare-and-delete release of the refresh lock.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Compact wire form of one profile snapshot. Embeddings travel as
/// base64-encoded packed little-endian bytes.
#[derive(Debug, Serialize, Deserialize)]
struct CachedProfile {
    profile_id: Uuid,
    user_id: Uuid,
    display_name: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
    embeddings: Vec<String>,
}

fn encode_profiles(snapshots: &[FaceProfileSnapshot]) -> Vec<CachedProfile> {
    snapshots
        .iter()
        .map(|s| CachedProfile {
            profile_id: s.profile_id,
            user_id: s.user_id,
            display_name: s.display_name.clone(),
            is_primary: s.is_primary,
            created_at: s.created_at,
            embeddings: s
                .embeddings
                .iter()
                .map(|e| BASE64.encode(FaceEmbedding::new(e.clone()).to_bytes()))
                .collect(),
        })
        .collect()
}

fn decode_profiles(cached: Vec<CachedProfile>) -> Vec<FaceProfileSnapshot> {
    cached
        .into_iter()
        .map(|c| {
            let embeddings = c
                .embeddings
                .iter()
                .filter_map(|encoded| BASE64.decode(encoded).ok())
                .map(|bytes| FaceEmbedding::from_bytes(&bytes))
                .filter(|e| !e.is_empty())
                .map(|e| e.values().to_vec())
                .collect();
            FaceProfileSnapshot::new(
                c.profile_id,
                c.user_id,
                c.display_name,
                c.is_primary,
                c.created_at,
                embeddings,
            )
        })
        .collect()
}

/// Redis-backed snapshot cache.
pub struct RedisSnapshotCache {
    client: redis::Client,
    payload_ttl: Duration,
    lock_ttl: Duration,
}

impl RedisSnapshotCache {
    /// Creates a cache over the given Redis URL.
    pub fn new(
        redis_url: &str,
        payload_ttl: Duration,
        lock_ttl: Duration,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            payload_ttl,
            lock_ttl,
        })
    }

    async fn connection(&self) -> Option<MultiplexedConnection> {
        match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Redis unavailable: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn try_get(&self) -> Option<(u64, Vec<FaceProfileSnapshot>)> {
        let mut conn = self.connection().await?;

        let version: u64 = match conn.get::<_, Option<u64>>(VERSION_KEY).await {
            Ok(Some(version)) => version,
            Ok(None) => return None,
            Err(e) => {
                warn!("Redis version read failed: {}", e);
                return None;
            }
        };

        let payload: String = match conn.get::<_, Option<String>>(PAYLOAD_KEY).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                warn!("Redis payload read failed: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Vec<CachedProfile>>(&payload) {
            Ok(cached) => Some((version, decode_profiles(cached))),
            Err(e) => {
                warn!("Discarding undecodable snapshot payload: {}", e);
                None
            }
        }
    }

    async fn set(&self, snapshots: &[FaceProfileSnapshot]) -> u64 {
        let Some(mut conn) = self.connection().await else {
            return 0;
        };

        let payload = match serde_json::to_string(&encode_profiles(snapshots)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Snapshot payload serialization failed: {}", e);
                return 0;
            }
        };

        // Payload first, then the version bump readers key off.
        if let Err(e) = conn
            .set_ex::<_, _, ()>(PAYLOAD_KEY, payload, self.payload_ttl.as_secs())
            .await
        {
            warn!("Redis payload write failed: {}", e);
            return 0;
        }

        match conn.incr::<_, _, u64>(VERSION_KEY, 1).await {
            Ok(version) => version,
            Err(e) => {
                warn!("Redis version increment failed: {}", e);
                0
            }
        }
    }

    async fn invalidate(&self) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let result: Result<(), redis::RedisError> = redis::pipe()
            .incr(VERSION_KEY, 1)
            .ignore()
            .expire(PAYLOAD_KEY, INVALIDATED_PAYLOAD_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await;

        if let Err(e) = result {
            warn!("Redis invalidation failed: {}", e);
        }
    }

    async fn try_acquire_lock(&self) -> Option<String> {
        let mut conn = self.connection().await?;
        let token = Uuid::new_v4().to_string();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(LOCK_KEY)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(self.lock_ttl.as_secs())
            .query_async(&mut conn)
            .await
            .unwrap_or_else(|e| {
                warn!("Redis lock acquisition failed: {}", e);
                None
            });

        acquired.map(|_| token)
    }

    async fn release_lock(&self, token: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };

        let released: Result<i64, redis::RedisError> = redis::Script::new(RELEASE_LOCK_SCRIPT)
            .key(LOCK_KEY)
            .arg(token)
            .invoke_async(&mut conn)
            .await;

        match released {
            Ok(0) => warn!("Refresh lock already expired or stolen"),
            Ok(_) => {}
            Err(e) => warn!("Redis lock release failed: {}", e),
        }
    }
}
