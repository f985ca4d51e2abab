//! Per-player capture statistics
//!
//! The whole ledger is persisted as one list under `stats/players`.
//! Saves go through a single async lane so an older snapshot never
//! overwrites a newer one.

use super::repository::{DataStore, STATS_KEY};
use crate::contract::{CaptureZonesError, PlayerId, PlayerStatRecord, StatisticsSnapshot};
use crate::infra::storage::entity::PlayerStatEntry;
use crate::infra::storage::mapper::{from_blob, to_blob};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct StatsLedger {
    records: Mutex<BTreeMap<PlayerId, PlayerStatRecord>>,
    store: Arc<dyn DataStore>,
    save_lane: tokio::sync::Mutex<()>,
}

impl StatsLedger {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            store,
            save_lane: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the in-memory ledger with the persisted one
    pub async fn load(&self) -> Result<usize, CaptureZonesError> {
        let raw = self
            .store
            .load(STATS_KEY)
            .await
            .map_err(CaptureZonesError::persistence)?;
        let entries: Vec<PlayerStatEntry> = match raw {
            Some(blob) => from_blob(STATS_KEY, blob).map_err(CaptureZonesError::persistence)?,
            None => Vec::new(),
        };

        let loaded: BTreeMap<PlayerId, PlayerStatRecord> = entries
            .into_iter()
            .map(PlayerStatRecord::from)
            .map(|record| (record.player.clone(), record))
            .collect();
        let count = loaded.len();
        *self.records.lock() = loaded;
        tracing::debug!(players = count, "player statistics loaded");
        Ok(count)
    }

    /// Count a capture for `player` and add `reward` to their total
    pub async fn record_capture(&self, player: &PlayerId, reward: f64, now: DateTime<Utc>) -> PlayerStatRecord {
        let record = {
            let mut records = self.records.lock();
            let record = records.entry(player.clone()).or_insert_with(|| PlayerStatRecord {
                player: player.clone(),
                captures: 0,
                reward_total: 0.0,
                last_capture_at: None,
            });
            record.captures += 1;
            record.reward_total += reward;
            record.last_capture_at = Some(now);
            record.clone()
        };
        self.persist().await;
        record
    }

    /// Forget one player. Returns false when there was nothing to remove.
    pub async fn remove(&self, player: &PlayerId) -> bool {
        let removed = self.records.lock().remove(player).is_some();
        if removed {
            tracing::info!(player = %player, "player statistics removed");
            self.persist().await;
        }
        removed
    }

    /// Clear every record, returning how many were dropped
    pub async fn reset_all(&self) -> usize {
        let dropped = std::mem::take(&mut *self.records.lock()).len();
        tracing::info!(players = dropped, "player statistics reset");
        self.persist().await;
        dropped
    }

    pub fn get(&self, player: &PlayerId) -> Option<PlayerStatRecord> {
        self.records.lock().get(player).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Players ordered by captures (desc), then id
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let mut players: Vec<PlayerStatRecord> = self.records.lock().values().cloned().collect();
        players.sort_by(|a, b| b.captures.cmp(&a.captures).then_with(|| a.player.cmp(&b.player)));
        StatisticsSnapshot {
            total_captures: players.iter().map(|p| p.captures).sum(),
            total_rewards: players.iter().map(|p| p.reward_total).sum(),
            players,
        }
    }

    // Stats are advisory; a failed save is logged and retried on the next change.
    async fn persist(&self) {
        let _lane = self.save_lane.lock().await;
        let entries: Vec<PlayerStatEntry> = self.records.lock().values().map(PlayerStatEntry::from).collect();
        let result = match to_blob(&entries) {
            Ok(blob) => self.store.save(STATS_KEY, &blob).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(error = %format!("{:#}", e), "failed to save player statistics");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::InMemoryDataStore;

    #[tokio::test]
    async fn test_record_and_snapshot_order() {
        let ledger = StatsLedger::new(Arc::new(InMemoryDataStore::new()));
        let now = Utc::now();

        ledger.record_capture(&PlayerId::from("alex"), 10.0, now).await;
        ledger.record_capture(&PlayerId::from("steve"), 5.0, now).await;
        ledger.record_capture(&PlayerId::from("steve"), 5.0, now).await;

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.players[0].player.as_str(), "steve");
        assert_eq!(snapshot.players[0].captures, 2);
        assert_eq!(snapshot.total_captures, 3);
        assert_eq!(snapshot.total_rewards, 20.0);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let ledger = StatsLedger::new(Arc::new(InMemoryDataStore::new()));

        assert!(!ledger.remove(&PlayerId::from("ghost")).await);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_load_restores_saved_records() {
        let store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
        let ledger = StatsLedger::new(store.clone());
        ledger.record_capture(&PlayerId::from("steve"), 7.5, Utc::now()).await;

        let reloaded = StatsLedger::new(store);
        assert_eq!(reloaded.load().await.unwrap(), 1);
        let record = reloaded.get(&PlayerId::from("steve")).unwrap();
        assert_eq!(record.captures, 1);
        assert_eq!(record.reward_total, 7.5);
    }
}
