//! Domain layer - business logic and services

pub mod command;
pub mod config_store;
pub mod events;
pub mod koth;
pub mod repository;
pub mod service;
pub mod shops;
pub mod stats;
pub mod validation;
pub mod world;
pub mod zones;

pub use config_store::{ConfigSchema, ConfigStore, RepairReport, ReloadReport};
pub use events::{Announcer, Audience, NoOpAnnouncer, ZoneEvent};
pub use repository::DataStore;
pub use service::{BulkOutcome, CaptureReceipt, LoadReport, Service, TickReport};
pub use world::{MockWorldProvider, NoOpWorldProvider, WorldError, WorldProvider};
