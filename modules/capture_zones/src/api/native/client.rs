//! Native client implementation - wraps domain service for in-process calls

use crate::contract::{
    ActiveCapture, CaptureZonesActionResult, CaptureZonesApi, ConfigSnapshot, DataFileNode, DataValue,
    FullSnapshot, Geometry, KothSnapshot, OverviewSnapshot, ShopSnapshot, StatisticsSnapshot, ZoneAttributes,
    ZoneSnapshot,
};
use crate::domain::command::{parse_command, AdminCommand, ReloadTarget, Target};
use crate::domain::{BulkOutcome, ReloadReport, Service};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Feature names reported by `capabilities`
const CAPABILITIES: &[&str] = &[
    "zones",
    "capture-state",
    "occupancy-contest",
    "koth",
    "koth-time-limit",
    "shops",
    "config-overrides",
    "config-repair",
    "statistics",
    "admin-commands",
    "data-files",
];

/// Native client implementation that directly calls the domain service
///
/// Domain errors are folded into failed action results here; nothing
/// past this point returns an `Err`.
#[derive(Clone)]
pub struct NativeClient {
    service: Arc<Service>,
}

impl NativeClient {
    /// Create a new native client
    pub fn new(service: Arc<Service>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }
}

fn id_list(ids: &[String]) -> DataValue {
    DataValue::List(ids.iter().map(|id| DataValue::Text(id.clone())).collect())
}

fn failures(failed: &[(String, String)]) -> DataValue {
    DataValue::Map(
        failed
            .iter()
            .map(|(id, error)| (id.clone(), DataValue::Text(error.clone())))
            .collect(),
    )
}

/// Aggregate result of a bulk operation; fails when any target failed
fn bulk_result(action: &str, outcome: BulkOutcome) -> CaptureZonesActionResult {
    let message = if outcome.is_clean() {
        format!("{}: {} changed", action, outcome.changed.len())
    } else {
        format!(
            "{}: {} changed, {} failed",
            action,
            outcome.changed.len(),
            outcome.failed.len()
        )
    };
    let base = if outcome.is_clean() {
        CaptureZonesActionResult::ok(message)
    } else {
        CaptureZonesActionResult::failed(message)
    };
    base.with("changed", outcome.changed.len())
        .with("unchanged", outcome.unchanged.len())
        .with("changed_ids", id_list(&outcome.changed))
        .with("failed", failures(&outcome.failed))
}

fn reload_result(message: &str, report: &ReloadReport) -> CaptureZonesActionResult {
    let base = if report.failed.is_empty() {
        CaptureZonesActionResult::ok(message)
    } else {
        CaptureZonesActionResult::failed(format!("{} with {} zone failure(s)", message, report.failed.len()))
    };
    base.with("zones_reloaded", report.zones_reloaded)
        .with("failed", failures(&report.failed))
}

#[async_trait]
impl CaptureZonesApi for NativeClient {
    fn api_version(&self) -> &str {
        self.service.api_version()
    }

    fn plugin_version(&self) -> &str {
        self.service.plugin_version()
    }

    fn capabilities(&self) -> Vec<&'static str> {
        CAPABILITIES.to_vec()
    }

    // ===== Snapshots =====

    async fn overview_snapshot(&self) -> OverviewSnapshot {
        self.service.overview_snapshot()
    }

    async fn full_snapshot(&self) -> FullSnapshot {
        self.service.full_snapshot()
    }

    async fn zones_snapshot(&self) -> Vec<ZoneSnapshot> {
        self.service.zones_snapshot()
    }

    async fn active_captures_snapshot(&self) -> Vec<ActiveCapture> {
        self.service.active_captures_snapshot()
    }

    async fn koth_snapshot(&self) -> KothSnapshot {
        self.service.koth_snapshot()
    }

    async fn shops_snapshot(&self) -> Vec<ShopSnapshot> {
        self.service.shops_snapshot()
    }

    async fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.service.statistics_snapshot()
    }

    async fn global_config_snapshot(&self) -> ConfigSnapshot {
        self.service.global_config_snapshot()
    }

    async fn zone_config_snapshot(&self, zone_id: &str) -> ConfigSnapshot {
        self.service.zone_config_snapshot(zone_id)
    }

    async fn data_files_snapshot(&self, depth: usize) -> BTreeMap<String, DataFileNode> {
        self.service.data_files_snapshot(depth).await
    }

    // ===== Zone Operations =====

    async fn create_zone(
        &self,
        zone_id: &str,
        geometry: Geometry,
        attributes: ZoneAttributes,
    ) -> CaptureZonesActionResult {
        match self.service.create_zone(zone_id, geometry, attributes).await {
            Ok(snapshot) => CaptureZonesActionResult::ok(format!("zone '{}' created", zone_id))
                .with("zone_id", snapshot.zone.id)
                .with("world", snapshot.zone.world)
                .with("shape", snapshot.zone.geometry.shape_name())
                .with("state", snapshot.state.name()),
            Err(e) => e.into(),
        }
    }

    async fn delete_zone(&self, zone_id: &str) -> CaptureZonesActionResult {
        match self.service.delete_zone(zone_id).await {
            Ok(zone) => CaptureZonesActionResult::ok(format!("zone '{}' deleted", zone.id)).with("zone_id", zone.id),
            Err(e) => e.into(),
        }
    }

    async fn force_capture(&self, zone_id: &str, player: &str) -> CaptureZonesActionResult {
        match self.service.force_capture(zone_id, player).await {
            Ok(receipt) => {
                CaptureZonesActionResult::ok(format!("zone '{}' captured by {}", receipt.zone_id, receipt.owner))
                    .with("zone_id", receipt.zone_id)
                    .with("owner", receipt.owner.to_string())
                    .with("reward", receipt.payout)
            }
            Err(e) => e.into(),
        }
    }

    async fn stop_capture(&self, zone_id: &str, reason: &str) -> CaptureZonesActionResult {
        match self.service.stop_capture(zone_id, reason).await {
            Ok(true) => CaptureZonesActionResult::ok(format!("capture on '{}' stopped", zone_id))
                .with("changed", true)
                .with("reason", reason),
            Ok(false) => CaptureZonesActionResult::ok(format!("no capture running on '{}'", zone_id))
                .with("changed", false),
            Err(e) => e.into(),
        }
    }

    async fn reset_point(&self, zone_id: &str) -> CaptureZonesActionResult {
        match self.service.reset_point(zone_id) {
            Ok(changed) => CaptureZonesActionResult::ok(format!("zone '{}' reset", zone_id)).with("changed", changed),
            Err(e) => e.into(),
        }
    }

    async fn reset_all_points(&self) -> CaptureZonesActionResult {
        bulk_result("reset all points", self.service.reset_all_points())
    }

    async fn set_point_type(&self, zone_id: &str, zone_type: &str) -> CaptureZonesActionResult {
        match self.service.set_point_type(zone_id, zone_type).await {
            Ok(zone) => CaptureZonesActionResult::ok(format!("zone '{}' is now {}", zone.id, zone.zone_type))
                .with("zone_type", zone.zone_type.as_str()),
            Err(e) => e.into(),
        }
    }

    async fn set_point_active(&self, zone_id: &str, active: bool) -> CaptureZonesActionResult {
        match self.service.set_point_active(zone_id, active).await {
            Ok(zone) => {
                let state = if zone.active { "activated" } else { "deactivated" };
                CaptureZonesActionResult::ok(format!("zone '{}' {}", zone.id, state)).with("active", zone.active)
            }
            Err(e) => e.into(),
        }
    }

    async fn set_point_player_limits(
        &self,
        zone_id: &str,
        min_players: i32,
        max_players: i32,
    ) -> CaptureZonesActionResult {
        match self
            .service
            .set_point_player_limits(zone_id, min_players, max_players)
            .await
        {
            Ok(zone) => {
                let result = CaptureZonesActionResult::ok(format!("player limits of '{}' updated", zone.id))
                    .with("min_players", f64::from(zone.min_players));
                match zone.max_players {
                    Some(max_players) => result.with("max_players", f64::from(max_players)),
                    None => result,
                }
            }
            Err(e) => e.into(),
        }
    }

    // ===== KOTH Operations =====

    async fn koth_start(&self, zone_ids: &[String], announce: bool) -> CaptureZonesActionResult {
        match self.service.koth_start(zone_ids, announce).await {
            Ok(joined) => CaptureZonesActionResult::ok(format!("KOTH started on {} zone(s)", joined.len()))
                .with("zones", id_list(&joined))
                .with("announce", announce),
            Err(e) => e.into(),
        }
    }

    async fn koth_stop(&self, zone_id: &str, reason: &str, announce: bool) -> CaptureZonesActionResult {
        match self.service.koth_stop(zone_id, reason, announce).await {
            Ok(session_ended) => CaptureZonesActionResult::ok(format!("KOTH stopped on '{}'", zone_id))
                .with("session_ended", session_ended)
                .with("reason", reason),
            Err(e) => e.into(),
        }
    }

    async fn koth_stop_all(&self, reason: &str, announce: bool) -> CaptureZonesActionResult {
        let outcome = self.service.koth_stop_all(reason, announce).await;
        bulk_result("stop KOTH", outcome).with("reason", reason)
    }

    async fn koth_assign_zone(&self, zone_id: &str, assign: bool) -> CaptureZonesActionResult {
        match self.service.koth_assign_zone(zone_id, assign) {
            Ok(changed) => {
                let verb = if assign { "assigned to" } else { "removed from" };
                CaptureZonesActionResult::ok(format!("zone '{}' {} KOTH", zone_id, verb))
                    .with("changed", changed)
                    .with("koth_running", self.service.koth().is_running())
            }
            Err(e) => e.into(),
        }
    }

    // ===== Shop Operations =====

    async fn shop_restock(&self, zone_id: &str) -> CaptureZonesActionResult {
        match self.service.shop_restock(zone_id).await {
            Ok(at) => CaptureZonesActionResult::ok(format!("shop '{}' restocked", zone_id))
                .with("last_restock", at.to_rfc3339()),
            Err(e) => e.into(),
        }
    }

    async fn shop_set_enabled(&self, zone_id: &str, enabled: bool) -> CaptureZonesActionResult {
        match self.service.shop_set_enabled(zone_id, enabled).await {
            Ok(changed) => {
                let state = if enabled { "enabled" } else { "disabled" };
                CaptureZonesActionResult::ok(format!("shop '{}' {}", zone_id, state)).with("changed", changed)
            }
            Err(e) => e.into(),
        }
    }

    async fn shop_reload_all(&self) -> CaptureZonesActionResult {
        bulk_result("reload shops", self.service.shop_reload_all())
    }

    // ===== Configuration Operations =====

    async fn set_zone_config_value(&self, zone_id: &str, path: &str, value: DataValue) -> CaptureZonesActionResult {
        let shown = value.to_string();
        match self.service.set_zone_config_value(zone_id, path, value).await {
            Ok(()) => CaptureZonesActionResult::ok(format!("{} set to {} for '{}'", path, shown, zone_id))
                .with("path", path),
            Err(e) => e.into(),
        }
    }

    async fn set_global_config_value(
        &self,
        path: &str,
        value: DataValue,
        reload_after_save: bool,
    ) -> CaptureZonesActionResult {
        let shown = value.to_string();
        match self
            .service
            .set_global_config_value(path, value, reload_after_save)
            .await
        {
            Ok(None) => CaptureZonesActionResult::ok(format!("{} set to {}", path, shown)).with("path", path),
            Ok(Some(report)) => {
                reload_result(&format!("{} set to {} and reloaded", path, shown), &report).with("path", path)
            }
            Err(e) => e.into(),
        }
    }

    async fn reset_zone_config_path(&self, zone_id: &str, path: &str) -> CaptureZonesActionResult {
        match self.service.reset_zone_config_path(zone_id, path).await {
            Ok(removed) => CaptureZonesActionResult::ok(format!("{} reset for '{}'", path, zone_id))
                .with("changed", removed),
            Err(e) => e.into(),
        }
    }

    async fn reset_zone_config(&self, zone_id: &str) -> CaptureZonesActionResult {
        match self.service.reset_zone_config(zone_id).await {
            Ok(removed) => CaptureZonesActionResult::ok(format!("{} override(s) cleared for '{}'", removed, zone_id))
                .with("removed", removed),
            Err(e) => e.into(),
        }
    }

    async fn reload_zone_config(&self, zone_id: &str) -> CaptureZonesActionResult {
        match self.service.reload_zone_config(zone_id).await {
            Ok(count) => CaptureZonesActionResult::ok(format!("config of '{}' reloaded", zone_id))
                .with("overrides", count),
            Err(e) => e.into(),
        }
    }

    async fn reload_all(&self) -> CaptureZonesActionResult {
        match self.service.reload_all().await {
            Ok(report) => reload_result("configuration reloaded", &report),
            Err(e) => e.into(),
        }
    }

    async fn reload_lang(&self) -> CaptureZonesActionResult {
        match self.service.reload_lang().await {
            Ok(()) => CaptureZonesActionResult::ok("messages reloaded"),
            Err(e) => e.into(),
        }
    }

    async fn repair_schema(&self, exact_templates: bool) -> CaptureZonesActionResult {
        match self.service.repair_schema(exact_templates).await {
            Ok(report) => CaptureZonesActionResult::ok(format!("{} config node(s) repaired", report.total()))
                .with("repaired", report.repaired)
                .with("removed", report.removed)
                .with("added", report.added)
                .with("exact_templates", exact_templates),
            Err(e) => e.into(),
        }
    }

    // ===== Statistics Operations =====

    async fn remove_player_stats(&self, player: &str) -> CaptureZonesActionResult {
        let removed = self.service.remove_player_stats(player).await;
        let message = if removed {
            format!("statistics of {} removed", player)
        } else {
            format!("no statistics recorded for {}", player)
        };
        CaptureZonesActionResult::ok(message).with("removed", removed)
    }

    async fn reset_all_stats(&self) -> CaptureZonesActionResult {
        let removed = self.service.reset_all_stats().await;
        CaptureZonesActionResult::ok(format!("statistics of {} player(s) cleared", removed)).with("removed", removed)
    }

    // ===== Admin =====

    async fn run_admin_command(&self, command_line: &str) -> CaptureZonesActionResult {
        let command = match parse_command(command_line) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(command_line, error = %e, "admin command rejected");
                return e.into();
            }
        };
        tracing::info!(command = ?command, "running admin command");

        match command {
            AdminCommand::ZoneCreate {
                id,
                world,
                geometry,
                reward,
            } => {
                let attributes = ZoneAttributes {
                    world,
                    reward: reward.unwrap_or_default(),
                    ..ZoneAttributes::default()
                };
                self.create_zone(&id, geometry, attributes).await
            }
            AdminCommand::ZoneDelete { id } => self.delete_zone(&id).await,
            AdminCommand::ZoneType { id, zone_type } => self.set_point_type(&id, &zone_type).await,
            AdminCommand::ZoneActive { id, active } => self.set_point_active(&id, active).await,
            AdminCommand::ZoneLimits { id, min, max } => self.set_point_player_limits(&id, min, max).await,
            AdminCommand::CaptureForce { id, player } => self.force_capture(&id, &player).await,
            AdminCommand::CaptureStop { id, reason } => self.stop_capture(&id, &reason).await,
            AdminCommand::CaptureReset { target: Target::All } => self.reset_all_points().await,
            AdminCommand::CaptureReset { target: Target::One(id) } => self.reset_point(&id).await,
            AdminCommand::KothStart { ids, announce } => self.koth_start(&ids, announce).await,
            AdminCommand::KothStop {
                target: Target::All,
                reason,
            } => self.koth_stop_all(&reason, true).await,
            AdminCommand::KothStop {
                target: Target::One(id),
                reason,
            } => self.koth_stop(&id, &reason, true).await,
            AdminCommand::KothAssign { id, assign } => self.koth_assign_zone(&id, assign).await,
            AdminCommand::ShopRestock { id } => self.shop_restock(&id).await,
            AdminCommand::ShopEnable { id, enabled } => self.shop_set_enabled(&id, enabled).await,
            AdminCommand::ShopReload => self.shop_reload_all().await,
            AdminCommand::ConfigSetGlobal { path, value } => self.set_global_config_value(&path, value, false).await,
            AdminCommand::ConfigSetZone { zone, path, value } => {
                self.set_zone_config_value(&zone, &path, value).await
            }
            AdminCommand::ConfigReset { zone, path: Some(path) } => self.reset_zone_config_path(&zone, &path).await,
            AdminCommand::ConfigReset { zone, path: None } => self.reset_zone_config(&zone).await,
            AdminCommand::ConfigRepair { exact } => self.repair_schema(exact).await,
            AdminCommand::Reload(ReloadTarget::All) => self.reload_all().await,
            AdminCommand::Reload(ReloadTarget::Lang) => self.reload_lang().await,
            AdminCommand::Reload(ReloadTarget::Zone(id)) => self.reload_zone_config(&id).await,
            AdminCommand::StatsRemove { player } => self.remove_player_stats(&player).await,
            AdminCommand::StatsReset => self.reset_all_stats().await,
        }
    }
}
