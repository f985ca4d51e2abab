//! Layered runtime configuration: schema defaults, global values, per-zone overrides
//!
//! Layers are flat maps keyed by dotted path. Persisted layers are nested
//! mappings and are flattened on load. Values that violate the schema are
//! kept as loaded (so `repair_schema` can fix them) but skipped during
//! resolution.

use super::repository::{zone_config_key, DataStore, GLOBAL_CONFIG_KEY};
use super::validation::{compile_schema, validate_against_schema};
use crate::contract::{CaptureZonesError, ConfigSnapshot, DataValue};
use dashmap::DashMap;
use jsonschema::Validator;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ConfigLayer = BTreeMap<String, DataValue>;

pub mod paths {
    pub const CAPTURE_TIME_SECONDS: &str = "capture.time-seconds";
    pub const CAPTURE_DECAY_WHEN_EMPTY: &str = "capture.decay-when-empty";
    pub const CAPTURE_ANNOUNCE: &str = "capture.announce";
    pub const CAPTURE_REQUIRE_EXCLUSIVE: &str = "capture.require-exclusive";
    pub const REWARD_BASE: &str = "reward.base";
    pub const REWARD_MULTIPLIER: &str = "reward.multiplier";
    pub const KOTH_DURATION_SECONDS: &str = "koth.duration-seconds";
    pub const SHOP_ENABLED_BY_DEFAULT: &str = "shop.enabled-by-default";
    pub const SHOP_RESTOCK_WHILE_DISABLED: &str = "shop.restock-while-disabled";
    pub const SHOP_ITEMS: &str = "shop.items";
    pub const MESSAGES_PREFIX: &str = "messages.prefix";
}

/// Schema of one config path
pub struct SchemaEntry {
    pub default: DataValue,
    validator: Validator,
}

/// Fixed table of known config paths
pub struct ConfigSchema {
    entries: BTreeMap<String, SchemaEntry>,
}

impl ConfigSchema {
    /// Schema for every path the runtime reads
    pub fn builtin() -> Result<Self, CaptureZonesError> {
        let table = [
            (paths::CAPTURE_TIME_SECONDS, json!({"type": "number", "exclusiveMinimum": 0}), DataValue::Number(30.0)),
            (paths::CAPTURE_DECAY_WHEN_EMPTY, json!({"type": "boolean"}), DataValue::Bool(true)),
            (paths::CAPTURE_ANNOUNCE, json!({"type": "boolean"}), DataValue::Bool(true)),
            (paths::CAPTURE_REQUIRE_EXCLUSIVE, json!({"type": "boolean"}), DataValue::Bool(false)),
            (paths::REWARD_BASE, json!({"type": "number", "minimum": 0}), DataValue::Number(0.0)),
            (paths::REWARD_MULTIPLIER, json!({"type": "number", "minimum": 0}), DataValue::Number(1.0)),
            (paths::KOTH_DURATION_SECONDS, json!({"type": "number", "exclusiveMinimum": 0}), DataValue::Number(600.0)),
            (paths::SHOP_ENABLED_BY_DEFAULT, json!({"type": "boolean"}), DataValue::Bool(true)),
            (paths::SHOP_RESTOCK_WHILE_DISABLED, json!({"type": "boolean"}), DataValue::Bool(false)),
            (paths::SHOP_ITEMS, json!({"type": "array", "items": {"type": "string", "pattern": "^[^:]+:\\s*[0-9]+(\\.[0-9]+)?\\s*$"}}), DataValue::List(Vec::new())),
            (paths::MESSAGES_PREFIX, json!({"type": "string"}), DataValue::Text("[Zones] ".to_string())),
        ];

        let mut entries = BTreeMap::new();
        for (path, schema, default) in table {
            let validator = compile_schema(path, &schema)?;
            validate_against_schema(path, &value_to_json(&default), &validator)?;
            entries.insert(path.to_string(), SchemaEntry { default, validator });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, path: &str) -> Option<&SchemaEntry> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// UnknownPath if the path has no entry, SchemaMismatch on type conflict
    pub fn check(&self, path: &str, value: &DataValue) -> Result<(), CaptureZonesError> {
        let entry = self.entry(path).ok_or_else(|| CaptureZonesError::UnknownPath {
            path: path.to_string(),
        })?;
        validate_against_schema(path, &value_to_json(value), &entry.validator).map_err(|e| match e {
            CaptureZonesError::SchemaMismatch { path, details } => CaptureZonesError::SchemaMismatch {
                path,
                details: format!("expected {} ({}), got {}", entry.default.kind(), details, value.kind()),
            },
            other => other,
        })
    }

    pub fn is_valid(&self, path: &str, value: &DataValue) -> bool {
        self.entry(path)
            .map(|entry| entry.validator.is_valid(&value_to_json(value)))
            .unwrap_or(false)
    }
}

/// What `repair_schema` changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairReport {
    /// `global:<path>` or `<zone>:<path>` entries reset to default or dropped as invalid
    pub repaired: Vec<String>,
    /// Unknown keys removed (exact templates only)
    pub removed: Vec<String>,
    /// Missing global paths filled with defaults (exact templates only)
    pub added: Vec<String>,
}

impl RepairReport {
    pub fn total(&self) -> usize {
        self.repaired.len() + self.removed.len() + self.added.len()
    }
}

/// Outcome of reloading every layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReloadReport {
    pub zones_reloaded: usize,
    pub failed: Vec<(String, String)>,
}

/// One zone's override layer and the lane its writes go through
#[derive(Default)]
struct ZoneLayer {
    values: Mutex<ConfigLayer>,
    lane: tokio::sync::Mutex<()>,
}

/// Layered config resolver
///
/// Writers, reloads and repairs of a layer hold that layer's lane from the
/// in-memory change until the store call returns, so saves of one layer reach
/// the store in the order their changes were made. Reads never take a lane.
pub struct ConfigStore {
    schema: ConfigSchema,
    global: RwLock<ConfigLayer>,
    global_lane: tokio::sync::Mutex<()>,
    zones: DashMap<String, Arc<ZoneLayer>>,
    store: Arc<dyn DataStore>,
}

impl ConfigStore {
    pub fn new(schema: ConfigSchema, store: Arc<dyn DataStore>) -> Self {
        Self {
            schema,
            global: RwLock::new(ConfigLayer::new()),
            global_lane: tokio::sync::Mutex::new(()),
            zones: DashMap::new(),
            store,
        }
    }

    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    fn zone_layer(&self, zone_id: &str) -> Arc<ZoneLayer> {
        self.zones.entry(zone_id.to_string()).or_default().clone()
    }

    fn existing_zone_layer(&self, zone_id: &str) -> Option<Arc<ZoneLayer>> {
        self.zones.get(zone_id).map(|layer| layer.clone())
    }

    // ===== Resolution =====

    /// Zone override, then global value, then schema default
    pub fn resolve(&self, zone_id: Option<&str>, path: &str) -> Option<DataValue> {
        let entry = self.schema.entry(path)?;
        if let Some(layer) = zone_id.and_then(|id| self.existing_zone_layer(id)) {
            if let Some(value) = layer.values.lock().get(path) {
                if self.schema.is_valid(path, value) {
                    return Some(value.clone());
                }
            }
        }
        if let Some(value) = self.global.read().get(path) {
            if self.schema.is_valid(path, value) {
                return Some(value.clone());
            }
        }
        Some(entry.default.clone())
    }

    pub fn number(&self, zone_id: Option<&str>, path: &str) -> f64 {
        self.resolve(zone_id, path).and_then(|v| v.as_f64()).unwrap_or_default()
    }

    pub fn flag(&self, zone_id: Option<&str>, path: &str) -> bool {
        self.resolve(zone_id, path).and_then(|v| v.as_bool()).unwrap_or_default()
    }

    pub fn text(&self, zone_id: Option<&str>, path: &str) -> String {
        self.resolve(zone_id, path)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn list(&self, zone_id: Option<&str>, path: &str) -> Vec<DataValue> {
        self.resolve(zone_id, path)
            .and_then(|v| v.as_list().map(<[DataValue]>::to_vec))
            .unwrap_or_default()
    }

    pub fn global_snapshot(&self) -> ConfigSnapshot {
        self.snapshot_for(None)
    }

    pub fn zone_snapshot(&self, zone_id: &str) -> ConfigSnapshot {
        self.snapshot_for(Some(zone_id))
    }

    fn snapshot_for(&self, zone_id: Option<&str>) -> ConfigSnapshot {
        self.schema
            .paths()
            .filter_map(|path| self.resolve(zone_id, path).map(|value| (path.clone(), value)))
            .collect()
    }

    /// Raw override entries of a zone, as stored
    pub fn zone_overrides(&self, zone_id: &str) -> ConfigLayer {
        self.existing_zone_layer(zone_id)
            .map(|layer| layer.values.lock().clone())
            .unwrap_or_default()
    }

    // ===== Mutation =====

    pub async fn set_zone_value(
        &self,
        zone_id: &str,
        path: &str,
        value: DataValue,
    ) -> Result<(), CaptureZonesError> {
        self.schema.check(path, &value)?;
        let layer = self.zone_layer(zone_id);
        let _lane = layer.lane.lock().await;
        let (previous, persisted) = {
            let mut guard = layer.values.lock();
            let previous = guard.insert(path.to_string(), value.clone());
            (previous, guard.clone())
        };

        if let Err(e) = self.store.save(&zone_config_key(zone_id), &layer_to_json(&persisted)).await {
            tracing::error!(zone_id, path, error = %e, "failed to save zone config, rolling back");
            restore_entry(&mut layer.values.lock(), path, previous);
            return Err(CaptureZonesError::persistence(e));
        }
        tracing::info!(zone_id, path, value = %value, "zone config override set");
        Ok(())
    }

    pub async fn set_global_value(&self, path: &str, value: DataValue) -> Result<(), CaptureZonesError> {
        self.schema.check(path, &value)?;
        let _lane = self.global_lane.lock().await;
        let (previous, persisted) = {
            let mut guard = self.global.write();
            let previous = guard.insert(path.to_string(), value.clone());
            (previous, guard.clone())
        };

        if let Err(e) = self.store.save(GLOBAL_CONFIG_KEY, &layer_to_json(&persisted)).await {
            tracing::error!(path, error = %e, "failed to save global config, rolling back");
            restore_entry(&mut self.global.write(), path, previous);
            return Err(CaptureZonesError::persistence(e));
        }
        tracing::info!(path, value = %value, "global config value set");
        Ok(())
    }

    /// Remove one override. Returns false when nothing was set.
    pub async fn reset_zone_path(&self, zone_id: &str, path: &str) -> Result<bool, CaptureZonesError> {
        let Some(layer) = self.existing_zone_layer(zone_id) else {
            return Ok(false);
        };
        let _lane = layer.lane.lock().await;
        let (previous, persisted) = {
            let mut guard = layer.values.lock();
            let Some(previous) = guard.remove(path) else {
                return Ok(false);
            };
            (previous, guard.clone())
        };

        if let Err(e) = self.store.save(&zone_config_key(zone_id), &layer_to_json(&persisted)).await {
            tracing::error!(zone_id, path, error = %e, "failed to save zone config, rolling back");
            restore_entry(&mut layer.values.lock(), path, Some(previous));
            return Err(CaptureZonesError::persistence(e));
        }
        tracing::info!(zone_id, path, "zone config override removed");
        Ok(true)
    }

    /// Clear every override of a zone. Returns the number removed.
    pub async fn reset_zone(&self, zone_id: &str) -> Result<usize, CaptureZonesError> {
        let Some(layer) = self.existing_zone_layer(zone_id) else {
            return Ok(0);
        };
        let _lane = layer.lane.lock().await;
        let previous = std::mem::take(&mut *layer.values.lock());
        if previous.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.store.delete(&zone_config_key(zone_id)).await {
            tracing::error!(zone_id, error = %e, "failed to delete zone config, rolling back");
            *layer.values.lock() = previous;
            return Err(CaptureZonesError::persistence(e));
        }
        tracing::info!(zone_id, removed = previous.len(), "zone config overrides cleared");
        Ok(previous.len())
    }

    /// Forget a deleted zone's overrides, in memory and on disk
    pub async fn drop_zone(&self, zone_id: &str) -> Result<(), CaptureZonesError> {
        let layer = self.zones.remove(zone_id).map(|(_, layer)| layer);
        let _lane = match &layer {
            Some(layer) => Some(layer.lane.lock().await),
            None => None,
        };
        self.store
            .delete(&zone_config_key(zone_id))
            .await
            .map_err(CaptureZonesError::persistence)
    }

    // ===== Reload =====

    async fn load_layer(&self, key: &str) -> Result<ConfigLayer, CaptureZonesError> {
        let raw = self.store.load(key).await.map_err(CaptureZonesError::persistence)?;
        match raw {
            None => Ok(ConfigLayer::new()),
            Some(value) => layer_from_json(&value).map_err(|message| CaptureZonesError::PersistenceFailure {
                message: format!("malformed config at '{}': {}", key, message),
            }),
        }
    }

    /// Re-read the global layer. The prior layer stays active on failure.
    pub async fn reload_global(&self) -> Result<usize, CaptureZonesError> {
        let _lane = self.global_lane.lock().await;
        let layer = self.load_layer(GLOBAL_CONFIG_KEY).await?;
        let count = layer.len();
        *self.global.write() = layer;
        Ok(count)
    }

    /// Re-read one zone's overrides. The prior layer stays active on failure.
    pub async fn reload_zone(&self, zone_id: &str) -> Result<usize, CaptureZonesError> {
        let slot = self.zone_layer(zone_id);
        let _lane = slot.lane.lock().await;
        let layer = self.load_layer(&zone_config_key(zone_id)).await?;
        let count = layer.len();
        *slot.values.lock() = layer;
        Ok(count)
    }

    /// Discard the store cache and re-read global plus every listed zone.
    ///
    /// A global failure aborts; zone failures are collected.
    pub async fn reload_all(&self, zone_ids: &[String]) -> Result<ReloadReport, CaptureZonesError> {
        self.store.reload().await.map_err(CaptureZonesError::persistence)?;
        self.reload_global().await?;

        let mut report = ReloadReport::default();
        for zone_id in zone_ids {
            match self.reload_zone(zone_id).await {
                Ok(_) => report.zones_reloaded += 1,
                Err(e) => {
                    tracing::warn!(zone_id = %zone_id, error = %e, "zone config reload failed, keeping prior values");
                    report.failed.push((zone_id.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    // ===== Repair =====

    /// Reset schema-violating values. `exact_templates` also drops unknown
    /// keys and fills missing global paths with defaults.
    pub async fn repair_schema(&self, exact_templates: bool) -> Result<RepairReport, CaptureZonesError> {
        let mut report = RepairReport::default();

        {
            let _lane = self.global_lane.lock().await;
            let global_snapshot = {
                let mut global = self.global.write();
                let changed = self.repair_layer(&mut global, "global", true, exact_templates, &mut report);
                changed.then(|| global.clone())
            };
            if let Some(layer) = global_snapshot {
                self.store
                    .save(GLOBAL_CONFIG_KEY, &layer_to_json(&layer))
                    .await
                    .map_err(CaptureZonesError::persistence)?;
            }
        }

        let zone_ids: Vec<String> = self.zones.iter().map(|entry| entry.key().clone()).collect();
        for zone_id in zone_ids {
            let Some(layer) = self.existing_zone_layer(&zone_id) else {
                continue;
            };
            let _lane = layer.lane.lock().await;
            let repaired = {
                let mut guard = layer.values.lock();
                let changed = self.repair_layer(&mut guard, &zone_id, false, exact_templates, &mut report);
                changed.then(|| guard.clone())
            };
            if let Some(values) = repaired {
                self.store
                    .save(&zone_config_key(&zone_id), &layer_to_json(&values))
                    .await
                    .map_err(CaptureZonesError::persistence)?;
            }
        }

        tracing::info!(
            repaired = report.repaired.len(),
            removed = report.removed.len(),
            added = report.added.len(),
            exact_templates,
            "config schema repaired"
        );
        Ok(report)
    }

    fn repair_layer(
        &self,
        layer: &mut ConfigLayer,
        owner: &str,
        is_global: bool,
        exact_templates: bool,
        report: &mut RepairReport,
    ) -> bool {
        let mut changed = false;
        let keys: Vec<String> = layer.keys().cloned().collect();
        for path in keys {
            match self.schema.entry(&path) {
                Some(entry) => {
                    let valid = layer.get(&path).is_some_and(|v| self.schema.is_valid(&path, v));
                    if valid {
                        continue;
                    }
                    if is_global {
                        layer.insert(path.clone(), entry.default.clone());
                    } else {
                        layer.remove(&path);
                    }
                    report.repaired.push(format!("{}:{}", owner, path));
                    changed = true;
                }
                None if exact_templates => {
                    layer.remove(&path);
                    report.removed.push(format!("{}:{}", owner, path));
                    changed = true;
                }
                None => {}
            }
        }

        if is_global && exact_templates {
            for (path, entry) in &self.schema.entries {
                if !layer.contains_key(path) {
                    layer.insert(path.clone(), entry.default.clone());
                    report.added.push(format!("{}:{}", owner, path));
                    changed = true;
                }
            }
        }
        changed
    }
}

fn restore_entry(layer: &mut ConfigLayer, path: &str, previous: Option<DataValue>) {
    match previous {
        Some(value) => {
            layer.insert(path.to_string(), value);
        }
        None => {
            layer.remove(path);
        }
    }
}

// ===== JSON mapping =====

pub fn value_to_json(value: &DataValue) -> Value {
    match value {
        DataValue::Text(s) => Value::String(s.clone()),
        DataValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                Value::Number(Number::from(*n as i64))
            } else {
                Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)
            }
        }
        DataValue::Bool(b) => Value::Bool(*b),
        DataValue::List(items) => Value::Array(items.iter().map(value_to_json).collect()),
        DataValue::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect()),
    }
}

/// `None` for JSON null, which has no `DataValue` counterpart
pub fn value_from_json(value: &Value) -> Option<DataValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(DataValue::Bool(*b)),
        Value::Number(n) => n.as_f64().map(DataValue::Number),
        Value::String(s) => Some(DataValue::Text(s.clone())),
        Value::Array(items) => items.iter().map(value_from_json).collect::<Option<Vec<_>>>().map(DataValue::List),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| value_from_json(v).map(|v| (k.clone(), v)))
            .collect::<Option<BTreeMap<_, _>>>()
            .map(DataValue::Map),
    }
}

/// Flatten a nested mapping into dotted paths
pub fn layer_from_json(value: &Value) -> Result<ConfigLayer, String> {
    let Value::Object(root) = value else {
        return Err("top level must be a mapping".to_string());
    };
    let mut layer = ConfigLayer::new();
    flatten_into(&mut layer, "", root)?;
    Ok(layer)
}

fn flatten_into(layer: &mut ConfigLayer, prefix: &str, map: &Map<String, Value>) -> Result<(), String> {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) => flatten_into(layer, &path, nested)?,
            other => {
                let converted = value_from_json(other).ok_or_else(|| format!("null value at '{}'", path))?;
                layer.insert(path, converted);
            }
        }
    }
    Ok(())
}

/// Nest dotted paths back into a mapping for persistence
pub fn layer_to_json(layer: &ConfigLayer) -> Value {
    let mut root = Map::new();
    for (path, value) in layer {
        let segments: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &segments, value_to_json(value));
    }
    Value::Object(root)
}

fn insert_path(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            node.insert(leaf.to_string(), value);
        }
        [head, rest @ ..] => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(next) = child {
                insert_path(next, rest, value);
            }
        }
    }
}
