//! World/player provider abstraction for host server integration

use crate::contract::{PlayerId, Position, Zone};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Error type for world provider operations
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("World not found: {0}")]
    WorldNotFound(String),

    #[error("World provider unavailable: {0}")]
    Unavailable(String),
}

/// Trait for querying the hosting game server
///
/// This abstraction allows switching between mock and real implementations
/// for testing and production use.
#[async_trait]
pub trait WorldProvider: Send + Sync {
    /// Whether a world with this name is known to the server
    async fn world_exists(&self, world: &str) -> Result<bool, WorldError>;

    /// Resolve a player name or id to a stable identity
    ///
    /// Returns None for players the server has never seen
    async fn resolve_player(&self, name: &str) -> Result<Option<PlayerId>, WorldError>;

    /// Players currently inside the zone's geometry
    ///
    /// Ordered by arrival: the first element is the longest present
    async fn occupants(&self, zone: &Zone) -> Result<Vec<PlayerId>, WorldError>;
}

#[derive(Clone, Default)]
pub struct NoOpWorldProvider;

#[async_trait]
impl WorldProvider for NoOpWorldProvider {
    async fn world_exists(&self, _world: &str) -> Result<bool, WorldError> {
        Ok(true)
    }

    async fn resolve_player(&self, name: &str) -> Result<Option<PlayerId>, WorldError> {
        Ok(Some(PlayerId::from(name)))
    }

    async fn occupants(&self, _zone: &Zone) -> Result<Vec<PlayerId>, WorldError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
struct PlacedPlayer {
    id: PlayerId,
    world: String,
    position: Position,
}

/// Mock implementation of WorldProvider for testing
///
/// Keeps players in arrival order with their last known position
#[derive(Clone)]
pub struct MockWorldProvider {
    worlds: Arc<RwLock<HashSet<String>>>,
    players: Arc<RwLock<Vec<PlacedPlayer>>>,
}

impl MockWorldProvider {
    /// Create a new mock provider with no worlds and no players
    pub fn new() -> Self {
        Self {
            worlds: Arc::new(RwLock::new(HashSet::new())),
            players: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn add_world(&self, world: &str) {
        self.worlds.write().insert(world.to_string());
    }

    /// Place or move a player. Moving keeps the original arrival order.
    pub fn place_player(&self, player: &str, world: &str, position: Position) {
        let mut players = self.players.write();
        match players.iter_mut().find(|p| p.id.as_str() == player) {
            Some(existing) => {
                existing.world = world.to_string();
                existing.position = position;
            }
            None => players.push(PlacedPlayer {
                id: PlayerId::from(player),
                world: world.to_string(),
                position,
            }),
        }
    }

    pub fn remove_player(&self, player: &str) {
        self.players.write().retain(|p| p.id.as_str() != player);
    }

    pub fn clear(&self) {
        self.players.write().clear();
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }
}

impl Default for MockWorldProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorldProvider for MockWorldProvider {
    async fn world_exists(&self, world: &str) -> Result<bool, WorldError> {
        Ok(self.worlds.read().contains(world))
    }

    async fn resolve_player(&self, name: &str) -> Result<Option<PlayerId>, WorldError> {
        Ok(self
            .players
            .read()
            .iter()
            .find(|p| p.id.as_str().eq_ignore_ascii_case(name))
            .map(|p| p.id.clone()))
    }

    async fn occupants(&self, zone: &Zone) -> Result<Vec<PlayerId>, WorldError> {
        if !self.worlds.read().contains(&zone.world) {
            return Err(WorldError::WorldNotFound(zone.world.clone()));
        }
        Ok(self
            .players
            .read()
            .iter()
            .filter(|p| p.world == zone.world && zone.geometry.contains(&p.position))
            .map(|p| p.id.clone())
            .collect())
    }
}
