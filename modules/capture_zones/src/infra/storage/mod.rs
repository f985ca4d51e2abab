//! Storage layer - persisted record shapes and data stores

pub mod entity;
pub mod mapper;
pub mod repositories;

pub use repositories::{FileDataStore, InMemoryDataStore};
