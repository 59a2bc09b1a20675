//! Sorted-set mirror of the position history.
//!
//! Each position is stored as a JSON member of one sorted set, scored by
//! its server time, so a range read returns the track in time order.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{key}` (default `target:positions`) | Sorted set | JSON positions scored by `serverTime` |
//!
//! After every add the set is trimmed to the newest `retention` members,
//! matching the in-memory bound. If the key turns out to hold some other
//! type (a leftover list from an older deployment, say), the key is
//! deleted once and the write retried.

use std::time::Duration;

use fred::prelude::*;
use rewind_types::Position;
use tracing::{debug, warn};

use crate::error::DbError;

/// Handle to the sorted set holding the mirrored history.
#[derive(Clone)]
pub struct HistoryStream {
    client: Client,
    key: String,
    retention: usize,
}

impl HistoryStream {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed or the
    /// retention is zero.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, key: &str, retention: usize) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!(key, retention, "Connected to Dragonfly");
        Self::from_client(client, key, retention)
    }

    /// Wrap an already-initialized client.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if `retention` is zero or `key` is empty.
    pub fn from_client(client: Client, key: &str, retention: usize) -> Result<Self, DbError> {
        if retention == 0 {
            return Err(DbError::Config("retention must be at least 1".to_owned()));
        }
        if key.is_empty() {
            return Err(DbError::Config("history key must not be empty".to_owned()));
        }
        Ok(Self {
            client,
            key: key.to_owned(),
            retention,
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Add `position` scored by its server time, then trim to retention.
    ///
    /// On [`DbError::TypeConflict`] the key is reset and the write retried
    /// once; a second conflict is returned.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or any store call fails.
    pub async fn append(&self, position: &Position) -> Result<(), DbError> {
        let member = serde_json::to_string(position)?;
        let score = score_of(position);

        match self.add_and_trim(&member, score).await {
            Err(DbError::TypeConflict { key }) => {
                warn!(key, "History key held an incompatible type, recreating");
                self.reset().await?;
                self.add_and_trim(&member, score).await
            }
            other => other,
        }
    }

    /// [`append`](Self::append) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Timeout`] if the store does not answer in time,
    /// otherwise whatever [`append`](Self::append) returns.
    pub async fn append_within(&self, position: &Position, timeout: Duration) -> Result<(), DbError> {
        tokio::time::timeout(timeout, self.append(position))
            .await
            .unwrap_or_else(|_| Err(timeout_error(timeout)))
    }

    async fn add_and_trim(&self, member: &str, score: f64) -> Result<(), DbError> {
        let _: i64 = self
            .client
            .zadd(&self.key, None, None, false, false, (score, member))
            .await
            .map_err(|e| self.classify(e))?;

        let removed: i64 = self
            .client
            .zremrangebyrank(&self.key, 0, trim_stop(self.retention))
            .await
            .map_err(|e| self.classify(e))?;

        if removed > 0 {
            debug!(key = %self.key, removed, "Trimmed history stream");
        }
        Ok(())
    }

    /// Delete the whole stream.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn reset(&self) -> Result<(), DbError> {
        let _: u32 = self.client.del(&self.key).await?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every retained position, ordered by server time.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::TypeConflict`] if the key is not a sorted set,
    /// [`DbError::Serialization`] if a member is not a position, or
    /// [`DbError::Dragonfly`] if the read fails.
    pub async fn fetch_all(&self) -> Result<Vec<Position>, DbError> {
        let members: Vec<String> = self
            .client
            .zrange(&self.key, 0, -1, None, false, None, false)
            .await
            .map_err(|e| self.classify(e))?;
        decode_members(&members)
    }

    /// [`fetch_all`](Self::fetch_all) bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Timeout`] if the store does not answer in time,
    /// otherwise whatever [`fetch_all`](Self::fetch_all) returns.
    pub async fn fetch_all_within(&self, timeout: Duration) -> Result<Vec<Position>, DbError> {
        tokio::time::timeout(timeout, self.fetch_all())
            .await
            .unwrap_or_else(|_| Err(timeout_error(timeout)))
    }

    /// Number of members in the stream.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    pub async fn len(&self) -> Result<u64, DbError> {
        let count: u64 = self
            .client
            .zcard(&self.key)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(count)
    }

    /// The sorted-set key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum number of members kept.
    pub const fn retention(&self) -> usize {
        self.retention
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }

    fn classify(&self, error: fred::error::Error) -> DbError {
        if is_wrong_type(&error) {
            DbError::TypeConflict {
                key: self.key.clone(),
            }
        } else {
            DbError::Dragonfly(error)
        }
    }
}

fn timeout_error(timeout: Duration) -> DbError {
    DbError::Timeout {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Whether a server reply is the `WRONGTYPE` error.
fn is_wrong_type(error: &fred::error::Error) -> bool {
    error.details().contains("WRONGTYPE")
}

/// Stop rank for `ZREMRANGEBYRANK key 0 stop` that keeps the newest
/// `retention` members: `-(retention + 1)`.
fn trim_stop(retention: usize) -> i64 {
    i64::try_from(retention)
        .unwrap_or(i64::MAX)
        .saturating_add(1)
        .saturating_neg()
}

/// Server time as a sorted-set score. Exact for anything below 2^53 ms.
#[allow(clippy::cast_precision_loss)]
const fn score_of(position: &Position) -> f64 {
    position.server_time as f64
}

fn decode_members(members: &[String]) -> Result<Vec<Position>, DbError> {
    let mut positions = Vec::with_capacity(members.len());
    for m in members {
        positions.push(serde_json::from_str(m)?);
    }
    Ok(positions)
}
