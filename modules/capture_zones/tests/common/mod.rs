//! Common test utilities and shared zone fixtures

#![allow(dead_code)]

use capture_zones::domain::{Announcer, Audience, DataStore, MockWorldProvider, Service};
use capture_zones::infra::storage::InMemoryDataStore;
use capture_zones::{Geometry, Position, ZoneAttributes};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Once};

pub const WORLD: &str = "world";

static TRACING: Once = Once::new();

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Print a formatted test header with purpose and coverage details
pub fn print_test_header(test_name: &str, purpose: &[&str]) {
    init_tracing();
    println!("\n{}", "=".repeat(80));
    println!("🧪 TEST: {}", test_name);
    println!("{}", "-".repeat(80));
    println!("📋 PURPOSE:");
    for line in purpose {
        println!("   • {}", line);
    }
    println!("{}\n", "=".repeat(80));
}

/// One announcement as seen by the messaging provider
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub audience: Audience,
    pub key: String,
    pub params: BTreeMap<String, String>,
}

/// Announcer that keeps every announcement for later assertions
#[derive(Default)]
pub struct RecordingAnnouncer {
    sent: Mutex<Vec<Announcement>>,
    reloads: Mutex<usize>,
}

impl RecordingAnnouncer {
    pub fn keys(&self) -> Vec<String> {
        self.sent.lock().iter().map(|a| a.key.clone()).collect()
    }

    pub fn sent(&self) -> Vec<Announcement> {
        self.sent.lock().clone()
    }

    pub fn reloads(&self) -> usize {
        *self.reloads.lock()
    }
}

#[async_trait::async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(
        &self,
        audience: Audience,
        key: &str,
        params: &BTreeMap<String, String>,
    ) -> anyhow::Result<()> {
        self.sent.lock().push(Announcement {
            audience,
            key: key.to_string(),
            params: params.clone(),
        });
        Ok(())
    }

    async fn reload_messages(&self) -> anyhow::Result<()> {
        *self.reloads.lock() += 1;
        Ok(())
    }
}

/// Service wired to in-memory collaborators
pub struct TestRig {
    pub service: Arc<Service>,
    pub store: Arc<dyn DataStore>,
    pub world: MockWorldProvider,
    pub announcer: Arc<RecordingAnnouncer>,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryDataStore::new()))
    }

    pub fn with_store(store: Arc<dyn DataStore>) -> Self {
        let world = MockWorldProvider::new();
        world.add_world(WORLD);
        let announcer = Arc::new(RecordingAnnouncer::default());
        let service = Service::new(store.clone(), Arc::new(world.clone()), announcer.clone(), "test-build")
            .expect("builtin schema compiles");
        Self {
            service: Arc::new(service),
            store,
            world,
            announcer,
        }
    }

    /// Create a point zone at `(x, 64, z)` with radius 2 chunks
    pub async fn point_zone(&self, zone_id: &str, x: f64, z: f64, reward: f64) {
        self.service
            .create_zone(zone_id, point(x, z, 2), attrs(reward))
            .await
            .expect("point zone created");
    }
}

pub fn point(x: f64, z: f64, radius_chunks: i32) -> Geometry {
    Geometry::Point {
        center: Position::new(x, 64.0, z),
        radius_chunks,
    }
}

pub fn attrs(reward: f64) -> ZoneAttributes {
    ZoneAttributes {
        world: WORLD.to_string(),
        reward,
        ..ZoneAttributes::default()
    }
}

pub fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
