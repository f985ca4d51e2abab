//! Native client trait for addons
//!
//! This trait defines the API that other modules and addons use to interact
//! with the capture zones runtime. Snapshot accessors never fail; mutating
//! commands always return a [`CaptureZonesActionResult`].

use super::model::{
    ActiveCapture, ConfigSnapshot, DataFileNode, DataValue, FullSnapshot, Geometry, KothSnapshot,
    OverviewSnapshot, ShopSnapshot, StatisticsSnapshot, ZoneAttributes, ZoneSnapshot,
};
use super::result::CaptureZonesActionResult;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Contract version of this API. May differ from the plugin build version.
pub const API_VERSION: &str = "1.2.0";

/// Capture zones API for addons
#[async_trait]
pub trait CaptureZonesApi: Send + Sync {
    // ===== Versions =====

    /// API contract version
    fn api_version(&self) -> &str;

    /// Build version of the hosting plugin
    fn plugin_version(&self) -> &str;

    /// Feature names supported by this implementation
    fn capabilities(&self) -> Vec<&'static str>;

    // ===== Snapshots =====

    async fn overview_snapshot(&self) -> OverviewSnapshot;

    async fn full_snapshot(&self) -> FullSnapshot;

    async fn zones_snapshot(&self) -> Vec<ZoneSnapshot>;

    async fn active_captures_snapshot(&self) -> Vec<ActiveCapture>;

    async fn koth_snapshot(&self) -> KothSnapshot;

    async fn shops_snapshot(&self) -> Vec<ShopSnapshot>;

    async fn statistics_snapshot(&self) -> StatisticsSnapshot;

    async fn global_config_snapshot(&self) -> ConfigSnapshot;

    /// Resolved config for a zone; empty for unknown zones
    async fn zone_config_snapshot(&self, zone_id: &str) -> ConfigSnapshot;

    /// Persisted data keys as a tree, truncated below `depth`
    async fn data_files_snapshot(&self, depth: usize) -> BTreeMap<String, DataFileNode>;

    // ===== Zone Operations =====

    async fn create_zone(
        &self,
        zone_id: &str,
        geometry: Geometry,
        attributes: ZoneAttributes,
    ) -> CaptureZonesActionResult;

    async fn delete_zone(&self, zone_id: &str) -> CaptureZonesActionResult;

    async fn force_capture(&self, zone_id: &str, player: &str) -> CaptureZonesActionResult;

    async fn stop_capture(&self, zone_id: &str, reason: &str) -> CaptureZonesActionResult;

    async fn reset_point(&self, zone_id: &str) -> CaptureZonesActionResult;

    async fn reset_all_points(&self) -> CaptureZonesActionResult;

    async fn set_point_type(&self, zone_id: &str, zone_type: &str) -> CaptureZonesActionResult;

    async fn set_point_active(&self, zone_id: &str, active: bool) -> CaptureZonesActionResult;

    async fn set_point_player_limits(
        &self,
        zone_id: &str,
        min_players: i32,
        max_players: i32,
    ) -> CaptureZonesActionResult;

    // ===== KOTH Operations =====

    async fn koth_start(&self, zone_ids: &[String], announce: bool) -> CaptureZonesActionResult;

    async fn koth_stop(&self, zone_id: &str, reason: &str, announce: bool)
        -> CaptureZonesActionResult;

    async fn koth_stop_all(&self, reason: &str, announce: bool) -> CaptureZonesActionResult;

    async fn koth_assign_zone(&self, zone_id: &str, assign: bool) -> CaptureZonesActionResult;

    // ===== Shop Operations =====

    async fn shop_restock(&self, zone_id: &str) -> CaptureZonesActionResult;

    async fn shop_set_enabled(&self, zone_id: &str, enabled: bool) -> CaptureZonesActionResult;

    async fn shop_reload_all(&self) -> CaptureZonesActionResult;

    // ===== Configuration Operations =====

    async fn set_zone_config_value(
        &self,
        zone_id: &str,
        path: &str,
        value: DataValue,
    ) -> CaptureZonesActionResult;

    async fn set_global_config_value(
        &self,
        path: &str,
        value: DataValue,
        reload_after_save: bool,
    ) -> CaptureZonesActionResult;

    async fn reset_zone_config_path(&self, zone_id: &str, path: &str) -> CaptureZonesActionResult;

    async fn reset_zone_config(&self, zone_id: &str) -> CaptureZonesActionResult;

    async fn reload_zone_config(&self, zone_id: &str) -> CaptureZonesActionResult;

    async fn reload_all(&self) -> CaptureZonesActionResult;

    async fn reload_lang(&self) -> CaptureZonesActionResult;

    async fn repair_schema(&self, exact_templates: bool) -> CaptureZonesActionResult;

    // ===== Statistics Operations =====

    async fn remove_player_stats(&self, player: &str) -> CaptureZonesActionResult;

    async fn reset_all_stats(&self) -> CaptureZonesActionResult;

    // ===== Admin =====

    /// Parse and run a free-form admin command line
    async fn run_admin_command(&self, command_line: &str) -> CaptureZonesActionResult;
}
