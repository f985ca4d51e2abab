//! Contract layer - public API for addons and inter-module communication
//!
//! This layer contains transport-agnostic models, the result envelope and
//! the native client trait.

pub mod client;
pub mod error;
pub mod model;
pub mod result;

pub use client::{CaptureZonesApi, API_VERSION};
pub use error::CaptureZonesError;
pub use model::{
    ActiveCapture, CaptureState, ConfigSnapshot, DataFileNode, DataValue, FullSnapshot, Geometry,
    KothSnapshot, OverviewSnapshot, PlayerId, PlayerStatRecord, Position, ShopItem, ShopSnapshot,
    StatisticsSnapshot, ValueKind, Zone, ZoneAttributes, ZoneSnapshot, ZoneType,
};
pub use result::CaptureZonesActionResult;
