//! Capture Zones Module
//!
//! Capture-point minigame runtime for game servers: a zone registry with a
//! per-zone capture state machine, king-of-the-hill sessions, layered
//! per-zone/global configuration, shops and player statistics, exposed to
//! addons through [`CaptureZonesApi`].

// Public exports
pub mod contract;
pub use contract::{
    client::CaptureZonesApi, error::CaptureZonesError, CaptureState, CaptureZonesActionResult, DataFileNode, DataValue,
    Geometry, PlayerId, Position, Zone, ZoneAttributes, ZoneType, API_VERSION,
};

pub mod module;
pub use module::CaptureZonesModule;

// Internal modules (hidden from public API)
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;
