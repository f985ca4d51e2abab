//! Domain service - the action dispatcher
//!
//! Every mutation validates its arguments before touching state and
//! persists outside of any zone lock. Bulk operations step through their
//! targets one at a time and report each outcome.

use super::config_store::{paths, ConfigSchema, ConfigStore, ReloadReport, RepairReport};
use super::events::{Announcer, Audience, ZoneEvent};
use super::koth::KothScheduler;
use super::repository::{shop_key, zone_key, DataStore, SHOPS_PREFIX, ZONES_PREFIX};
use super::shops::ShopRegistry;
use super::stats::StatsLedger;
use super::validation::{parse_zone_type, validate_player_limits};
use super::world::WorldProvider;
use super::zones::{CaptureDriver, ContestRule, TickOutcome, ZoneRegistry, ZoneUpdate};
use crate::contract::{
    ActiveCapture, CaptureState, CaptureZonesError, ConfigSnapshot, DataFileNode, DataValue, FullSnapshot,
    Geometry, KothSnapshot, OverviewSnapshot, PlayerId, ShopSnapshot, StatisticsSnapshot, Zone, ZoneAttributes,
    ZoneSnapshot, API_VERSION,
};
use crate::infra::storage::entity::{ShopRecord, ZoneRecord};
use crate::infra::storage::mapper::{from_blob, to_blob};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-target outcome of a bulk operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BulkOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, id: &str, result: Result<bool, CaptureZonesError>) {
        match result {
            Ok(true) => self.changed.push(id.to_string()),
            Ok(false) => self.unchanged.push(id.to_string()),
            Err(e) => self.failed.push((id.to_string(), e.to_string())),
        }
    }
}

/// A capture that paid out
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReceipt {
    pub zone_id: String,
    pub owner: PlayerId,
    pub payout: f64,
}

/// What `load` restored
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub zones: usize,
    pub skipped: Vec<String>,
    pub shops: usize,
    pub players: usize,
}

/// What a `tick` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub captures: Vec<CaptureReceipt>,
    pub koth_expired: Vec<String>,
}

/// Capture zones runtime: registry, KOTH, config, shops and stats behind one dispatcher
pub struct Service {
    zones: Arc<ZoneRegistry>,
    koth: KothScheduler,
    config: ConfigStore,
    stats: StatsLedger,
    shops: ShopRegistry,
    store: Arc<dyn DataStore>,
    world: Arc<dyn WorldProvider>,
    announcer: Arc<dyn Announcer>,
    plugin_version: String,
}

impl Service {
    /// Create a new service instance
    pub fn new(
        store: Arc<dyn DataStore>,
        world: Arc<dyn WorldProvider>,
        announcer: Arc<dyn Announcer>,
        plugin_version: impl Into<String>,
    ) -> Result<Self, CaptureZonesError> {
        let zones = Arc::new(ZoneRegistry::new());
        Ok(Self {
            koth: KothScheduler::new(zones.clone()),
            config: ConfigStore::new(ConfigSchema::builtin()?, store.clone()),
            stats: StatsLedger::new(store.clone()),
            shops: ShopRegistry::new(),
            zones,
            store,
            world,
            announcer,
            plugin_version: plugin_version.into(),
        })
    }

    pub fn api_version(&self) -> &'static str {
        API_VERSION
    }

    pub fn plugin_version(&self) -> &str {
        &self.plugin_version
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn koth(&self) -> &KothScheduler {
        &self.koth
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn stats(&self) -> &StatsLedger {
        &self.stats
    }

    pub fn shops(&self) -> &ShopRegistry {
        &self.shops
    }

    // ===== Startup =====

    /// Restore zones, config, shops and stats from the data store.
    ///
    /// Malformed zone records are skipped with a warning.
    pub async fn load(&self) -> Result<LoadReport, CaptureZonesError> {
        let keys = self.store.list_keys().await.map_err(CaptureZonesError::persistence)?;
        let mut report = LoadReport::default();

        let mut restored = Vec::new();
        for key in keys.iter().filter(|k| k.starts_with(ZONES_PREFIX)) {
            match self.read_zone(key).await {
                Ok(zone) => restored.push(zone),
                Err(e) => {
                    tracing::warn!(key = %key, error = %format!("{:#}", e), "skipping unreadable zone record");
                    report.skipped.push(key.clone());
                }
            }
        }

        let ids: Vec<String> = restored.iter().map(|zone| zone.id.clone()).collect();
        let config = self.config.reload_all(&ids).await?;
        for (zone_id, error) in &config.failed {
            tracing::warn!(zone_id = %zone_id, error = %error, "zone config not loaded");
        }

        for zone in restored {
            let zone_id = zone.id.clone();
            match self.zones.restore(zone) {
                Ok(_) => {
                    let enabled = self.config.flag(Some(&zone_id), paths::SHOP_ENABLED_BY_DEFAULT);
                    self.shops.register(&zone_id, enabled);
                    report.zones += 1;
                }
                Err(e) => {
                    tracing::warn!(zone_id = %zone_id, error = %e, "zone not restored");
                    report.skipped.push(zone_key(&zone_id));
                }
            }
        }

        for key in keys.iter().filter(|k| k.starts_with(SHOPS_PREFIX)) {
            let zone_id = &key[SHOPS_PREFIX.len()..];
            if !self.shops.contains(zone_id) {
                tracing::warn!(zone_id, "shop record without zone, ignoring");
                continue;
            }
            match self.load_shop_record(key).await {
                Ok(Some(record)) => {
                    self.shops.restore(zone_id, record);
                    report.shops += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(key = %key, error = %format!("{:#}", e), "skipping unreadable shop record"),
            }
        }
        self.reload_catalogs();

        report.players = self.stats.load().await?;
        tracing::info!(
            zones = report.zones,
            skipped = report.skipped.len(),
            shops = report.shops,
            players = report.players,
            "capture zones state loaded"
        );
        Ok(report)
    }

    async fn read_zone(&self, key: &str) -> anyhow::Result<Zone> {
        let Some(blob) = self.store.load(key).await? else {
            anyhow::bail!("record vanished");
        };
        let record: ZoneRecord = from_blob(key, blob)?;
        Zone::try_from(record)
    }

    async fn load_shop_record(&self, key: &str) -> anyhow::Result<Option<ShopRecord>> {
        match self.store.load(key).await? {
            Some(blob) => Ok(Some(from_blob(key, blob)?)),
            None => Ok(None),
        }
    }

    // ===== Persistence helpers =====

    async fn save_zone(&self, zone: &Zone) -> Result<(), CaptureZonesError> {
        let blob = to_blob(&ZoneRecord::from(zone)).map_err(CaptureZonesError::persistence)?;
        self.store
            .save(&zone_key(&zone.id), &blob)
            .await
            .map_err(CaptureZonesError::persistence)
    }

    async fn save_shop(&self, zone_id: &str, record: &ShopRecord) -> Result<(), CaptureZonesError> {
        let blob = to_blob(record).map_err(CaptureZonesError::persistence)?;
        self.store
            .save(&shop_key(zone_id), &blob)
            .await
            .map_err(CaptureZonesError::persistence)
    }

    /// Persist an attribute change, undoing it in memory if the save fails
    async fn commit_update(&self, update: ZoneUpdate) -> Result<Zone, CaptureZonesError> {
        if update.previous == update.current {
            return Ok(update.current);
        }
        match self.save_zone(&update.current).await {
            Ok(()) => Ok(update.current),
            Err(e) => {
                tracing::error!(zone_id = %update.current.id, error = %e, "failed to save zone, rolling back");
                self.zones.revert(update);
                Err(e)
            }
        }
    }

    async fn announce(&self, event: ZoneEvent, audience: Audience) {
        let mut params = event.params();
        params.insert("prefix".to_string(), self.config.text(None, paths::MESSAGES_PREFIX));
        if let Err(e) = self.announcer.announce(audience, event.message_key(), &params).await {
            tracing::warn!(key = event.message_key(), error = %format!("{:#}", e), "announcement failed");
        }
    }

    // ===== Zone Operations =====

    pub async fn create_zone(
        &self,
        zone_id: &str,
        geometry: Geometry,
        attrs: ZoneAttributes,
    ) -> Result<ZoneSnapshot, CaptureZonesError> {
        if let Some(max_players) = attrs.max_players.filter(|max| *max < attrs.min_players) {
            return Err(CaptureZonesError::invalid_argument(format!(
                "maxPlayers ({}) must be >= minPlayers ({})",
                max_players, attrs.min_players
            )));
        }
        if !attrs.reward.is_finite() || attrs.reward < 0.0 {
            return Err(CaptureZonesError::invalid_argument("reward must be a non-negative number"));
        }
        match self.world.world_exists(&attrs.world).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(CaptureZonesError::invalid_argument(format!("unknown world '{}'", attrs.world)));
            }
            Err(e) => tracing::warn!(world = %attrs.world, error = %e, "world provider unavailable, accepting world"),
        }

        let zone = Zone {
            id: zone_id.to_string(),
            name: attrs.name.unwrap_or_else(|| zone_id.to_string()),
            world: attrs.world,
            geometry,
            zone_type: attrs.zone_type,
            active: attrs.active,
            min_players: attrs.min_players,
            max_players: attrs.max_players,
            reward: attrs.reward,
            created_at: Utc::now(),
        };
        let snapshot = self.zones.create(zone)?;

        if let Err(e) = self.save_zone(&snapshot.zone).await {
            tracing::error!(zone_id, error = %e, "failed to save new zone, rolling back");
            let _ = self.zones.delete_with(zone_id, |_| {});
            return Err(e);
        }

        self.shops
            .register(zone_id, self.config.flag(Some(zone_id), paths::SHOP_ENABLED_BY_DEFAULT));
        if let Err(e) = self
            .shops
            .reload_catalog(zone_id, &self.config.list(Some(zone_id), paths::SHOP_ITEMS))
        {
            tracing::warn!(zone_id, error = %e, "shop catalog not loaded");
        }

        tracing::info!(
            zone_id,
            world = %snapshot.zone.world,
            shape = snapshot.zone.geometry.shape_name(),
            zone_type = %snapshot.zone.zone_type,
            "zone created"
        );
        Ok(snapshot)
    }

    /// Remove a zone with its shop, overrides and KOTH membership
    pub async fn delete_zone(&self, zone_id: &str) -> Result<Zone, CaptureZonesError> {
        if !self.zones.contains(zone_id) {
            return Err(CaptureZonesError::zone_not_found(zone_id));
        }
        self.store
            .delete(&zone_key(zone_id))
            .await
            .map_err(CaptureZonesError::persistence)?;

        let zone = self.zones.delete_with(zone_id, |_| {
            if self.koth.evict(zone_id) {
                tracing::info!(zone_id, "deleted zone left KOTH session");
            }
        })?;

        self.shops.unregister(zone_id);
        if let Err(e) = self.store.delete(&shop_key(zone_id)).await {
            tracing::warn!(zone_id, error = %format!("{:#}", e), "failed to delete shop record");
        }
        if let Err(e) = self.config.drop_zone(zone_id).await {
            tracing::warn!(zone_id, error = %e, "failed to delete zone config");
        }

        tracing::info!(zone_id, "zone deleted");
        Ok(zone)
    }

    /// Payout for a capture of `zone` under its resolved config
    pub fn payout(&self, zone: &Zone) -> f64 {
        let multiplier = self.config.number(Some(&zone.id), paths::REWARD_MULTIPLIER);
        let base = self.config.number(Some(&zone.id), paths::REWARD_BASE);
        zone.reward * multiplier + base
    }

    async fn resolve_player(&self, name: &str) -> Result<PlayerId, CaptureZonesError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CaptureZonesError::invalid_argument("player must not be empty"));
        }
        match self.world.resolve_player(name).await {
            Ok(Some(player)) => Ok(player),
            Ok(None) => Ok(PlayerId::new(name)),
            Err(e) => {
                tracing::warn!(player = name, error = %e, "player lookup failed, using the raw name");
                Ok(PlayerId::new(name))
            }
        }
    }

    async fn credit_capture(&self, zone: &Zone, owner: PlayerId, forced: bool) -> CaptureReceipt {
        let payout = self.payout(zone);
        self.stats.record_capture(&owner, payout, Utc::now()).await;
        if self.config.flag(Some(&zone.id), paths::CAPTURE_ANNOUNCE) {
            let event = ZoneEvent::captured(&zone.id, &owner, payout, forced);
            self.announce(event, Audience::World(zone.world.clone())).await;
        }
        CaptureReceipt {
            zone_id: zone.id.clone(),
            owner,
            payout,
        }
    }

    /// Set `CAPTURED(owner)` unconditionally and credit the owner
    pub async fn force_capture(&self, zone_id: &str, player: &str) -> Result<CaptureReceipt, CaptureZonesError> {
        if !self.zones.contains(zone_id) {
            return Err(CaptureZonesError::zone_not_found(zone_id));
        }
        let owner = self.resolve_player(player).await?;
        let zone = self.zones.force_capture(zone_id, owner.clone())?;
        Ok(self.credit_capture(&zone, owner, true).await)
    }

    pub async fn stop_capture(&self, zone_id: &str, reason: &str) -> Result<bool, CaptureZonesError> {
        let changed = self.zones.stop_capture(zone_id, reason)?;
        if changed && self.config.flag(Some(zone_id), paths::CAPTURE_ANNOUNCE) {
            self.announce(ZoneEvent::stopped(zone_id, reason), Audience::Broadcast).await;
        }
        Ok(changed)
    }

    pub fn reset_point(&self, zone_id: &str) -> Result<bool, CaptureZonesError> {
        let changed = self.zones.reset_point(zone_id)?;
        if changed {
            tracing::info!(zone_id, "capture point reset");
        }
        Ok(changed)
    }

    /// Reset every zone; a failing zone does not stop the rest
    pub fn reset_all_points(&self) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for zone_id in self.zones.ids() {
            let result = self.zones.reset_valid_point(&zone_id);
            if let Err(e) = &result {
                tracing::warn!(zone_id = %zone_id, error = %e, "reset failed");
            }
            outcome.record(&zone_id, result);
        }
        tracing::info!(
            changed = outcome.changed.len(),
            failed = outcome.failed.len(),
            "all capture points reset"
        );
        outcome
    }

    pub async fn set_point_type(&self, zone_id: &str, zone_type: &str) -> Result<Zone, CaptureZonesError> {
        let zone_type = parse_zone_type(zone_type)?;
        let update = self.zones.set_type(zone_id, zone_type)?;
        let zone = self.commit_update(update).await?;
        tracing::info!(zone_id, zone_type = %zone.zone_type, "zone type set");
        Ok(zone)
    }

    pub async fn set_point_active(&self, zone_id: &str, active: bool) -> Result<Zone, CaptureZonesError> {
        let update = self.zones.set_active(zone_id, active)?;
        let zone = self.commit_update(update).await?;
        tracing::info!(zone_id, active, "zone active flag set");
        Ok(zone)
    }

    pub async fn set_point_player_limits(
        &self,
        zone_id: &str,
        min_players: i32,
        max_players: i32,
    ) -> Result<Zone, CaptureZonesError> {
        let (min_players, max_players) = validate_player_limits(min_players, max_players)?;
        let update = self.zones.set_player_limits(zone_id, min_players, max_players)?;
        let zone = self.commit_update(update).await?;
        tracing::info!(zone_id, min_players, max_players, "zone player limits set");
        Ok(zone)
    }

    // ===== KOTH Operations =====

    pub async fn koth_start(&self, zone_ids: &[String], announce: bool) -> Result<Vec<String>, CaptureZonesError> {
        let joined = self.koth.start(zone_ids, announce, Utc::now())?;
        if announce && !joined.is_empty() {
            self.announce(ZoneEvent::koth_started(joined.clone()), Audience::Broadcast).await;
        }
        Ok(joined)
    }

    /// Remove one member and stop its capture. Returns true when the session ended.
    pub async fn koth_stop(&self, zone_id: &str, reason: &str, announce: bool) -> Result<bool, CaptureZonesError> {
        let ended = self.koth.stop(zone_id)?;
        if let Err(e) = self.zones.stop_capture(zone_id, reason) {
            tracing::debug!(zone_id, error = %e, "KOTH zone gone before stop");
        }
        tracing::info!(zone_id, reason, session_ended = ended, "KOTH zone stopped");
        if announce {
            let event = ZoneEvent::koth_stopped(vec![zone_id.to_string()], reason);
            self.announce(event, Audience::Broadcast).await;
        }
        Ok(ended)
    }

    /// Remove every member; an empty session is a no-op
    pub async fn koth_stop_all(&self, reason: &str, announce: bool) -> BulkOutcome {
        let removed = self.koth.stop_all();
        let mut outcome = BulkOutcome::default();
        for zone_id in &removed {
            // leaving the session is the change; the capture may already be idle
            match self.zones.stop_capture(zone_id, reason) {
                Ok(_) => outcome.changed.push(zone_id.clone()),
                Err(e) => outcome.failed.push((zone_id.clone(), e.to_string())),
            }
        }
        tracing::info!(zones = ?removed, reason, "KOTH session stopped");
        if announce && !removed.is_empty() {
            self.announce(ZoneEvent::koth_stopped(removed, reason), Audience::Broadcast).await;
        }
        outcome
    }

    pub fn koth_assign_zone(&self, zone_id: &str, assign: bool) -> Result<bool, CaptureZonesError> {
        self.koth.assign(zone_id, assign, Utc::now())
    }

    fn koth_duration(&self) -> f64 {
        self.config.number(None, paths::KOTH_DURATION_SECONDS)
    }

    // ===== Shop Operations =====

    pub async fn shop_restock(&self, zone_id: &str) -> Result<DateTime<Utc>, CaptureZonesError> {
        let allow = self.config.flag(Some(zone_id), paths::SHOP_RESTOCK_WHILE_DISABLED);
        let now = Utc::now();
        let record = self.shops.restock(zone_id, allow, now)?;
        self.save_shop(zone_id, &record).await?;
        Ok(now)
    }

    pub async fn shop_set_enabled(&self, zone_id: &str, enabled: bool) -> Result<bool, CaptureZonesError> {
        let (changed, record) = self.shops.set_enabled(zone_id, enabled)?;
        if changed {
            if let Err(e) = self.save_shop(zone_id, &record).await {
                tracing::error!(zone_id, error = %e, "failed to save shop, rolling back");
                let _ = self.shops.set_enabled(zone_id, !enabled);
                return Err(e);
            }
        }
        Ok(changed)
    }

    /// Re-derive every catalog from `shop.items`
    pub fn shop_reload_all(&self) -> BulkOutcome {
        let outcome = self.reload_catalogs();
        tracing::info!(
            reloaded = outcome.changed.len(),
            failed = outcome.failed.len(),
            "shop catalogs reloaded"
        );
        outcome
    }

    fn reload_catalogs(&self) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for zone_id in self.shops.ids() {
            let entries = self.config.list(Some(&zone_id), paths::SHOP_ITEMS);
            let result = self.shops.reload_catalog(&zone_id, &entries).map(|_| true);
            if let Err(e) = &result {
                tracing::warn!(zone_id = %zone_id, error = %e, "shop catalog not reloaded");
            }
            outcome.record(&zone_id, result);
        }
        outcome
    }

    // ===== Config Operations =====

    fn require_zone(&self, zone_id: &str) -> Result<(), CaptureZonesError> {
        if self.zones.contains(zone_id) {
            Ok(())
        } else {
            Err(CaptureZonesError::zone_not_found(zone_id))
        }
    }

    fn require_path(&self, path: &str) -> Result<(), CaptureZonesError> {
        match self.config.schema().entry(path) {
            Some(_) => Ok(()),
            None => Err(CaptureZonesError::UnknownPath { path: path.to_string() }),
        }
    }

    fn refresh_catalog_if(&self, zone_id: &str, path: &str) {
        if path != paths::SHOP_ITEMS {
            return;
        }
        let entries = self.config.list(Some(zone_id), paths::SHOP_ITEMS);
        if let Err(e) = self.shops.reload_catalog(zone_id, &entries) {
            tracing::warn!(zone_id, error = %e, "shop catalog not refreshed");
        }
    }

    pub async fn set_zone_config_value(
        &self,
        zone_id: &str,
        path: &str,
        value: DataValue,
    ) -> Result<(), CaptureZonesError> {
        self.require_zone(zone_id)?;
        self.config.set_zone_value(zone_id, path, value).await?;
        self.refresh_catalog_if(zone_id, path);
        Ok(())
    }

    /// Returns the reload report when `reload_after_save` is set
    pub async fn set_global_config_value(
        &self,
        path: &str,
        value: DataValue,
        reload_after_save: bool,
    ) -> Result<Option<ReloadReport>, CaptureZonesError> {
        self.config.set_global_value(path, value).await?;
        if reload_after_save {
            return self.reload_all().await.map(Some);
        }
        if path == paths::SHOP_ITEMS {
            self.reload_catalogs();
        }
        Ok(None)
    }

    pub async fn reset_zone_config_path(&self, zone_id: &str, path: &str) -> Result<bool, CaptureZonesError> {
        self.require_zone(zone_id)?;
        self.require_path(path)?;
        let removed = self.config.reset_zone_path(zone_id, path).await?;
        if removed {
            self.refresh_catalog_if(zone_id, path);
        }
        Ok(removed)
    }

    pub async fn reset_zone_config(&self, zone_id: &str) -> Result<usize, CaptureZonesError> {
        self.require_zone(zone_id)?;
        let removed = self.config.reset_zone(zone_id).await?;
        if removed > 0 {
            self.refresh_catalog_if(zone_id, paths::SHOP_ITEMS);
        }
        Ok(removed)
    }

    pub async fn reload_zone_config(&self, zone_id: &str) -> Result<usize, CaptureZonesError> {
        self.require_zone(zone_id)?;
        let count = self.config.reload_zone(zone_id).await?;
        self.refresh_catalog_if(zone_id, paths::SHOP_ITEMS);
        tracing::info!(zone_id, overrides = count, "zone config reloaded");
        Ok(count)
    }

    /// Re-read every config layer and re-derive shop catalogs
    pub async fn reload_all(&self) -> Result<ReloadReport, CaptureZonesError> {
        let report = self.config.reload_all(&self.zones.ids()).await?;
        self.reload_catalogs();
        tracing::info!(
            zones = report.zones_reloaded,
            failed = report.failed.len(),
            "configuration reloaded"
        );
        Ok(report)
    }

    pub async fn reload_lang(&self) -> Result<(), CaptureZonesError> {
        self.announcer
            .reload_messages()
            .await
            .map_err(CaptureZonesError::persistence)?;
        tracing::info!("messages reloaded");
        Ok(())
    }

    pub async fn repair_schema(&self, exact_templates: bool) -> Result<RepairReport, CaptureZonesError> {
        let report = self.config.repair_schema(exact_templates).await?;
        if report.total() > 0 {
            self.reload_catalogs();
        }
        Ok(report)
    }

    // ===== Stats Operations =====

    pub async fn remove_player_stats(&self, player: &str) -> bool {
        self.stats.remove(&PlayerId::from(player)).await
    }

    pub async fn reset_all_stats(&self) -> usize {
        self.stats.reset_all().await
    }

    // ===== Occupancy =====

    /// Contest rule for a zone, resolved from its config
    pub fn contest_rule(&self, zone_id: &str) -> ContestRule {
        ContestRule {
            capture_seconds: self.config.number(Some(zone_id), paths::CAPTURE_TIME_SECONDS),
            decay_when_empty: self.config.flag(Some(zone_id), paths::CAPTURE_DECAY_WHEN_EMPTY),
            require_exclusive: self.config.flag(Some(zone_id), paths::CAPTURE_REQUIRE_EXCLUSIVE),
        }
    }

    /// Advance every contestable zone by `dt_seconds` and expire a KOTH
    /// session that has run its duration.
    pub async fn tick(&self, now: DateTime<Utc>, dt_seconds: f64) -> TickReport {
        let mut report = TickReport::default();

        for snapshot in self.zones.snapshot() {
            let zone = &snapshot.zone;
            if !zone.active
                || !zone.zone_type.is_contestable()
                || matches!(snapshot.state, CaptureState::Captured { .. } | CaptureState::Stopped { .. })
            {
                continue;
            }
            let occupants = match self.world.occupants(zone).await {
                Ok(occupants) => occupants,
                Err(e) => {
                    tracing::warn!(zone_id = %zone.id, error = %e, "occupancy unavailable");
                    continue;
                }
            };
            let driver = if snapshot.koth_member {
                CaptureDriver::Koth
            } else {
                CaptureDriver::Regular
            };
            let rule = self.contest_rule(&zone.id);

            match self.zones.advance(&zone.id, &occupants, driver, &rule, dt_seconds) {
                Ok(TickOutcome::Captured { owner, zone }) => {
                    tracing::info!(zone_id = %zone.id, owner = %owner, "zone captured");
                    report.captures.push(self.credit_capture(&zone, owner, false).await);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(zone_id = %zone.id, error = %e, "zone gone during tick"),
            }
        }

        if self.koth.expired(now, self.koth_duration()) {
            let outcome = self.koth_stop_all("time-limit", self.koth.announce()).await;
            report.koth_expired = outcome.changed;
        }
        report
    }

    // ===== Snapshots =====

    pub fn zones_snapshot(&self) -> Vec<ZoneSnapshot> {
        self.zones.snapshot()
    }

    pub fn active_captures_snapshot(&self) -> Vec<ActiveCapture> {
        active_captures_of(&self.zones.snapshot())
    }

    pub fn koth_snapshot(&self) -> KothSnapshot {
        self.koth.snapshot(Utc::now(), self.koth_duration())
    }

    pub fn shops_snapshot(&self) -> Vec<ShopSnapshot> {
        self.shops.snapshot()
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub fn global_config_snapshot(&self) -> ConfigSnapshot {
        self.config.global_snapshot()
    }

    /// Empty for unknown zones
    pub fn zone_config_snapshot(&self, zone_id: &str) -> ConfigSnapshot {
        if !self.zones.contains(zone_id) {
            return ConfigSnapshot::new();
        }
        self.config.zone_snapshot(zone_id)
    }

    pub fn overview_snapshot(&self) -> OverviewSnapshot {
        let zones = self.zones.snapshot();
        self.overview_of(&zones)
    }

    fn overview_of(&self, zones: &[ZoneSnapshot]) -> OverviewSnapshot {
        let koth = self.koth.members();
        OverviewSnapshot {
            api_version: API_VERSION.to_string(),
            plugin_version: self.plugin_version.clone(),
            zones: zones.len(),
            active_zones: zones.iter().filter(|z| z.zone.active).count(),
            contested: zones
                .iter()
                .filter(|z| matches!(z.state, CaptureState::Contested { .. }))
                .count(),
            captured: zones.iter().filter(|z| z.state.owner().is_some()).count(),
            koth_running: !koth.is_empty(),
            koth_members: koth.len(),
            shops_enabled: self.shops.enabled_count(),
            tracked_players: self.stats.len(),
        }
    }

    pub fn full_snapshot(&self) -> FullSnapshot {
        let zones = self.zones.snapshot();
        FullSnapshot {
            overview: self.overview_of(&zones),
            active_captures: active_captures_of(&zones),
            zones,
            koth: self.koth_snapshot(),
            shops: self.shops_snapshot(),
            statistics: self.statistics_snapshot(),
            global_config: self.global_config_snapshot(),
        }
    }

    /// Stored keys as a `/`-separated tree, directories below `depth` collapsed.
    ///
    /// A store failure yields an empty tree.
    pub async fn data_files_snapshot(&self, depth: usize) -> BTreeMap<String, DataFileNode> {
        match self.store.list_keys().await {
            Ok(keys) => build_file_tree(&keys, depth.max(1)),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "data store listing failed");
                BTreeMap::new()
            }
        }
    }
}

fn active_captures_of(zones: &[ZoneSnapshot]) -> Vec<ActiveCapture> {
    zones
        .iter()
        .filter_map(|snapshot| match &snapshot.state {
            CaptureState::Contested { claimant, progress } => Some(ActiveCapture {
                zone_id: snapshot.zone.id.clone(),
                player: claimant.clone(),
                progress: *progress,
                captured: false,
            }),
            CaptureState::Captured { owner } => Some(ActiveCapture {
                zone_id: snapshot.zone.id.clone(),
                player: owner.clone(),
                progress: 1.0,
                captured: true,
            }),
            _ => None,
        })
        .collect()
}

fn build_file_tree(keys: &[String], depth: usize) -> BTreeMap<String, DataFileNode> {
    let mut root = BTreeMap::new();
    for key in keys {
        let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
        insert_key(&mut root, &segments, depth);
    }
    root
}

fn insert_key(level: &mut BTreeMap<String, DataFileNode>, segments: &[&str], depth: usize) {
    match segments {
        [] => {}
        [leaf] => {
            level.entry((*leaf).to_string()).or_insert(DataFileNode::File);
        }
        [dir, rest @ ..] => {
            let node = level.entry((*dir).to_string()).or_insert(DataFileNode::File);
            if matches!(node, DataFileNode::File) {
                *node = if depth > 1 {
                    DataFileNode::Directory(BTreeMap::new())
                } else {
                    DataFileNode::Truncated { entries: 0 }
                };
            }
            match node {
                DataFileNode::Directory(children) => insert_key(children, rest, depth - 1),
                DataFileNode::Truncated { entries } => *entries += 1,
                DataFileNode::File => {}
            }
        }
    }
}
