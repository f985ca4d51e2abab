//! Contract models for the capture zones runtime
//!
//! These models are transport-agnostic and used for inter-module communication.
//! NO serde derives - persisted shapes live in infra/storage/mapper.rs.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Player identity as reported by the world provider
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Closed variant used for config values and auxiliary result data
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<DataValue>),
    Map(BTreeMap<String, DataValue>),
}

/// Discriminant of a [`DataValue`], used in schema mismatch messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Number,
    Bool,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Bool => "boolean",
            Self::List => "list",
            Self::Map => "mapping",
        };
        f.write_str(name)
    }
}

impl DataValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Number(_) => ValueKind::Number,
            Self::Bool(_) => ValueKind::Bool,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DataValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<usize> for DataValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for DataValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value.into_iter().map(DataValue::Text).collect())
    }
}

/// World-space position in block coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Chunk column containing this position (16x16 blocks)
    pub fn chunk(&self) -> (i64, i64) {
        ((self.x / 16.0).floor() as i64, (self.z / 16.0).floor() as i64)
    }
}

/// Zone region: exactly one of point-radius or cuboid
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Center point plus a radius measured in chunks
    Point { center: Position, radius_chunks: i32 },
    /// Axis-aligned box between two corners (inclusive)
    Cuboid { min: Position, max: Position },
}

impl Geometry {
    /// Check if a position is inside this region.
    ///
    /// Point zones cover every chunk within `radius_chunks` (chessboard
    /// distance) of the center chunk, full world height.
    pub fn contains(&self, pos: &Position) -> bool {
        match self {
            Self::Point {
                center,
                radius_chunks,
            } => {
                let (cx, cz) = center.chunk();
                let (px, pz) = pos.chunk();
                let radius = i64::from(*radius_chunks);
                (px - cx).abs() <= radius && (pz - cz).abs() <= radius
            }
            Self::Cuboid { min, max } => {
                pos.x >= min.x
                    && pos.x <= max.x
                    && pos.y >= min.y
                    && pos.y <= max.y
                    && pos.z >= min.z
                    && pos.z <= max.z
            }
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Point { .. } => "point",
            Self::Cuboid { .. } => "cuboid",
        }
    }
}

/// Zone type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    /// Regular capture point contested by occupancy
    CapturePoint,
    /// Shop only, never contested
    ShopOnly,
    /// Capture point that may join KOTH sessions
    KothEligible,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CapturePoint => "capture",
            Self::ShopOnly => "shop",
            Self::KothEligible => "koth",
        }
    }

    /// Whether occupancy may contest this zone
    pub fn is_contestable(&self) -> bool {
        !matches!(self, Self::ShopOnly)
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "capture" | "capture_point" | "capture-point" => Ok(Self::CapturePoint),
            "shop" | "shop_only" | "shop-only" => Ok(Self::ShopOnly),
            "koth" | "koth_eligible" | "koth-eligible" => Ok(Self::KothEligible),
            other => Err(format!("unknown zone type '{}'", other)),
        }
    }
}

/// Zone definition. The id never changes after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub id: String,
    pub name: String,
    /// Opaque world name resolved by the world provider
    pub world: String,
    pub geometry: Geometry,
    pub zone_type: ZoneType,
    pub active: bool,
    pub min_players: u32,
    /// `None` means no upper bound
    pub max_players: Option<u32>,
    pub reward: f64,
    pub created_at: DateTime<Utc>,
}

/// Optional attributes for zone creation
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneAttributes {
    /// Display name, defaults to the id
    pub name: Option<String>,
    pub world: String,
    pub zone_type: ZoneType,
    pub active: bool,
    pub min_players: u32,
    pub max_players: Option<u32>,
    pub reward: f64,
}

impl Default for ZoneAttributes {
    fn default() -> Self {
        Self {
            name: None,
            world: "world".to_string(),
            zone_type: ZoneType::CapturePoint,
            active: true,
            min_players: 1,
            max_players: None,
            reward: 0.0,
        }
    }
}

/// Per-zone capture state machine
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    /// No contest, no owner change in progress
    Idle,
    /// Progress (0.0..1.0) accumulating toward `claimant`
    Contested { claimant: PlayerId, progress: f64 },
    /// Owned until reset
    Captured { owner: PlayerId },
    /// Contest forcibly halted
    Stopped { reason: String },
}

impl CaptureState {
    /// Owner is set if and only if the state is `Captured`
    pub fn owner(&self) -> Option<&PlayerId> {
        match self {
            Self::Captured { owner } => Some(owner),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Contested { .. } => "CONTESTED",
            Self::Captured { .. } => "CAPTURED",
            Self::Stopped { .. } => "STOPPED",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("IDLE"),
            Self::Contested { claimant, progress } => {
                write!(f, "CONTESTED({}, {:.0}%)", claimant, progress * 100.0)
            }
            Self::Captured { owner } => write!(f, "CAPTURED({})", owner),
            Self::Stopped { reason } => write!(f, "STOPPED({})", reason),
        }
    }
}

// ===== Snapshots =====

/// Zone definition plus its current capture state
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSnapshot {
    pub zone: Zone,
    pub state: CaptureState,
    pub koth_member: bool,
}

/// A zone that is being contested or is owned
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCapture {
    pub zone_id: String,
    pub player: PlayerId,
    /// 1.0 once captured
    pub progress: f64,
    pub captured: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KothSnapshot {
    pub running: bool,
    pub members: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub announce: bool,
    pub remaining_seconds: Option<f64>,
}

/// Catalog entry parsed from `shop.items`
#[derive(Debug, Clone, PartialEq)]
pub struct ShopItem {
    pub item: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopSnapshot {
    pub zone_id: String,
    pub enabled: bool,
    pub last_restock: Option<DateTime<Utc>>,
    pub catalog: Vec<ShopItem>,
}

/// Per-player capture statistics
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatRecord {
    pub player: PlayerId,
    pub captures: u64,
    pub reward_total: f64,
    pub last_capture_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatisticsSnapshot {
    pub players: Vec<PlayerStatRecord>,
    pub total_captures: u64,
    pub total_rewards: f64,
}

/// Flattened path -> value view of resolved configuration
pub type ConfigSnapshot = BTreeMap<String, DataValue>;

/// Node of the data files tree returned by the data files snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum DataFileNode {
    File,
    Directory(BTreeMap<String, DataFileNode>),
    /// Directory below the requested depth; carries the number of entries under it
    Truncated { entries: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverviewSnapshot {
    pub api_version: String,
    pub plugin_version: String,
    pub zones: usize,
    pub active_zones: usize,
    pub contested: usize,
    pub captured: usize,
    pub koth_running: bool,
    pub koth_members: usize,
    pub shops_enabled: usize,
    pub tracked_players: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FullSnapshot {
    pub overview: OverviewSnapshot,
    pub zones: Vec<ZoneSnapshot>,
    pub active_captures: Vec<ActiveCapture>,
    pub koth: KothSnapshot,
    pub shops: Vec<ShopSnapshot>,
    pub statistics: StatisticsSnapshot,
    pub global_config: ConfigSnapshot,
}
