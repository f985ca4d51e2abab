//! Per-zone shop state
//!
//! Shops exist for every zone and are keyed by zone id. They carry no
//! reference back into the zone registry.

use super::validation::parse_shop_item;
use crate::contract::{CaptureZonesError, DataValue, ShopItem, ShopSnapshot};
use crate::infra::storage::entity::ShopRecord;
use crate::infra::storage::mapper::shop_record;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct ShopState {
    enabled: bool,
    last_restock: Option<DateTime<Utc>>,
    catalog: Vec<ShopItem>,
}

#[derive(Default)]
pub struct ShopRegistry {
    shops: DashMap<String, Arc<Mutex<ShopState>>>,
}

impl ShopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, zone_id: &str) -> Result<Arc<Mutex<ShopState>>, CaptureZonesError> {
        self.shops
            .get(zone_id)
            .map(|slot| slot.clone())
            .ok_or_else(|| CaptureZonesError::NotFound {
                resource: "shop".to_string(),
                id: zone_id.to_string(),
            })
    }

    /// Add a shop for a new zone; an existing shop is left as it is
    pub fn register(&self, zone_id: &str, enabled: bool) {
        self.shops.entry(zone_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(ShopState {
                enabled,
                ..ShopState::default()
            }))
        });
    }

    /// Apply a persisted record, creating the shop if needed
    pub fn restore(&self, zone_id: &str, record: ShopRecord) {
        let slot = self.shops.entry(zone_id.to_string()).or_default().clone();
        let mut shop = slot.lock();
        shop.enabled = record.enabled;
        shop.last_restock = record.last_restock;
    }

    pub fn unregister(&self, zone_id: &str) -> bool {
        self.shops.remove(zone_id).is_some()
    }

    pub fn contains(&self, zone_id: &str) -> bool {
        self.shops.contains_key(zone_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shops.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Refresh the stock timestamp.
    ///
    /// A disabled shop fails with `InvalidState` unless `allow_while_disabled`.
    pub fn restock(
        &self,
        zone_id: &str,
        allow_while_disabled: bool,
        now: DateTime<Utc>,
    ) -> Result<ShopRecord, CaptureZonesError> {
        let slot = self.slot(zone_id)?;
        let mut shop = slot.lock();
        if !shop.enabled && !allow_while_disabled {
            return Err(CaptureZonesError::InvalidState {
                reason: format!("shop '{}' is disabled", zone_id),
            });
        }
        shop.last_restock = Some(now);
        tracing::info!(zone_id, items = shop.catalog.len(), "shop restocked");
        Ok(shop_record(shop.enabled, shop.last_restock))
    }

    /// Returns whether the flag changed, plus the record to persist
    pub fn set_enabled(&self, zone_id: &str, enabled: bool) -> Result<(bool, ShopRecord), CaptureZonesError> {
        let slot = self.slot(zone_id)?;
        let mut shop = slot.lock();
        let changed = shop.enabled != enabled;
        shop.enabled = enabled;
        if changed {
            tracing::info!(zone_id, enabled, "shop toggled");
        }
        Ok((changed, shop_record(shop.enabled, shop.last_restock)))
    }

    /// Replace a shop's catalog from `shop.items` entries.
    ///
    /// Every entry is parsed before the catalog is swapped, so a bad entry
    /// leaves the previous catalog in place.
    pub fn reload_catalog(&self, zone_id: &str, entries: &[DataValue]) -> Result<usize, CaptureZonesError> {
        let slot = self.slot(zone_id)?;
        let catalog = entries
            .iter()
            .map(|entry| match entry {
                DataValue::Text(text) => parse_shop_item(text),
                other => Err(CaptureZonesError::invalid_argument(format!(
                    "shop entry must be a string, got {}",
                    other.kind()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = catalog.len();
        slot.lock().catalog = catalog;
        Ok(count)
    }

    pub fn get(&self, zone_id: &str) -> Option<ShopSnapshot> {
        let slot = self.slot(zone_id).ok()?;
        let shop = slot.lock();
        Some(Self::snapshot_of(zone_id, &shop))
    }

    pub fn enabled_count(&self) -> usize {
        self.shops.iter().filter(|entry| entry.value().lock().enabled).count()
    }

    /// Every shop, ordered by zone id
    pub fn snapshot(&self) -> Vec<ShopSnapshot> {
        self.ids().iter().filter_map(|id| self.get(id)).collect()
    }

    fn snapshot_of(zone_id: &str, shop: &ShopState) -> ShopSnapshot {
        ShopSnapshot {
            zone_id: zone_id.to_string(),
            enabled: shop.enabled,
            last_restock: shop.last_restock,
            catalog: shop.catalog.clone(),
        }
    }
}
