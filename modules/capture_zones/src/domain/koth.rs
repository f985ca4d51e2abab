//! King-of-the-hill session bookkeeping
//!
//! The scheduler owns only the session (member ids, start time, announce
//! flag). Zone state changes go through the registry and the service
//! primitives. Lock order is always zone lock before session lock; no method
//! here takes a zone lock while holding the session lock.
//!
//! Membership changes are two steps: the session is edited, then each
//! touched zone copies its flag from the session under its own lock. Since
//! the copy reads the session while holding the zone lock, whichever sync
//! runs last for a zone leaves its flag equal to its membership.

use super::zones::ZoneRegistry;
use crate::contract::{CaptureZonesError, KothSnapshot, ZoneType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default)]
struct KothSession {
    members: BTreeSet<String>,
    started_at: Option<DateTime<Utc>>,
    announce: bool,
}

impl KothSession {
    fn is_running(&self) -> bool {
        !self.members.is_empty()
    }

    fn close_if_empty(&mut self) -> bool {
        if self.members.is_empty() && self.started_at.is_some() {
            self.started_at = None;
            self.announce = false;
            return true;
        }
        false
    }
}

/// Coordinates the set of zones currently in KOTH mode
pub struct KothScheduler {
    zones: Arc<ZoneRegistry>,
    session: Mutex<KothSession>,
}

impl KothScheduler {
    pub fn new(zones: Arc<ZoneRegistry>) -> Self {
        Self {
            zones,
            session: Mutex::new(KothSession::default()),
        }
    }

    fn check_eligible(&self, zone_id: &str) -> Result<(), CaptureZonesError> {
        let snapshot = self.zones.get(zone_id).ok_or_else(|| {
            CaptureZonesError::invalid_argument(format!("unknown zone '{}'", zone_id))
        })?;
        if snapshot.zone.zone_type == ZoneType::ShopOnly {
            return Err(CaptureZonesError::invalid_argument(format!(
                "zone '{}' is shop-only and cannot join KOTH",
                zone_id
            )));
        }
        Ok(())
    }

    /// Add zones to the session, starting it if inactive.
    ///
    /// Each joined zone is reset to `IDLE`. Returns the ids that joined;
    /// zones deleted while joining are dropped from the session.
    pub fn start(
        &self,
        zone_ids: &[String],
        announce: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, CaptureZonesError> {
        if zone_ids.is_empty() {
            return Err(CaptureZonesError::invalid_argument("kothStart needs at least one zone"));
        }
        let unique: BTreeSet<&String> = zone_ids.iter().collect();
        if unique.len() != zone_ids.len() {
            return Err(CaptureZonesError::invalid_argument("kothStart zone list has duplicates"));
        }
        for zone_id in zone_ids {
            self.check_eligible(zone_id)?;
        }

        {
            let mut session = self.session.lock();
            if let Some(member) = zone_ids.iter().find(|id| session.members.contains(*id)) {
                return Err(CaptureZonesError::invalid_argument(format!(
                    "zone '{}' is already a KOTH member",
                    member
                )));
            }
            if !session.is_running() {
                session.started_at = Some(now);
                session.announce = announce;
            }
            session.members.extend(zone_ids.iter().cloned());
        }

        let mut joined = Vec::with_capacity(zone_ids.len());
        for zone_id in zone_ids {
            match self.sync_zone(zone_id) {
                Ok(true) => joined.push(zone_id.clone()),
                Ok(false) => tracing::debug!(zone_id = %zone_id, "zone left KOTH before joining"),
                Err(e) => {
                    tracing::warn!(zone_id = %zone_id, error = %e, "zone vanished while joining KOTH");
                    self.evict(zone_id);
                }
            }
        }
        tracing::info!(zones = ?joined, announce, "KOTH session started");
        Ok(joined)
    }

    /// Remove a single member. Fails with NotFound if it is not a member.
    ///
    /// Returns true when this emptied the session.
    pub fn stop(&self, zone_id: &str) -> Result<bool, CaptureZonesError> {
        let ended = {
            let mut session = self.session.lock();
            if !session.members.remove(zone_id) {
                return Err(CaptureZonesError::NotFound {
                    resource: "koth_member".to_string(),
                    id: zone_id.to_string(),
                });
            }
            session.close_if_empty()
        };
        self.release_zone(zone_id);
        Ok(ended)
    }

    /// Remove every member, returning the ids that were removed by this call
    pub fn stop_all(&self) -> Vec<String> {
        let removed: Vec<String> = {
            let mut session = self.session.lock();
            let removed = std::mem::take(&mut session.members).into_iter().collect();
            session.close_if_empty();
            removed
        };
        for zone_id in &removed {
            self.release_zone(zone_id);
        }
        removed
    }

    /// Add or remove one zone without starting/stopping the whole session.
    ///
    /// Returns false when membership already matched `assign`.
    pub fn assign(
        &self,
        zone_id: &str,
        assign: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, CaptureZonesError> {
        if !self.zones.contains(zone_id) {
            return Err(CaptureZonesError::zone_not_found(zone_id));
        }
        if assign {
            self.check_eligible(zone_id)?;
            {
                let mut session = self.session.lock();
                if session.members.contains(zone_id) {
                    return Ok(false);
                }
                if !session.is_running() {
                    session.started_at = Some(now);
                }
                session.members.insert(zone_id.to_string());
            }
            match self.sync_zone(zone_id) {
                Ok(true) => tracing::info!(zone_id, "zone assigned to KOTH"),
                Ok(false) => tracing::debug!(zone_id, "zone unassigned again before joining"),
                Err(e) => {
                    self.evict(zone_id);
                    return Err(e);
                }
            }
            Ok(true)
        } else {
            {
                let mut session = self.session.lock();
                if !session.members.remove(zone_id) {
                    return Ok(false);
                }
                if session.close_if_empty() {
                    tracing::info!("KOTH session ended: last member unassigned");
                }
            }
            self.release_zone(zone_id);
            tracing::info!(zone_id, "zone unassigned from KOTH");
            Ok(true)
        }
    }

    /// Drop a zone from the session without touching the zone itself.
    ///
    /// Called from zone deletion while the zone lock is held.
    pub fn evict(&self, zone_id: &str) -> bool {
        let mut session = self.session.lock();
        let removed = session.members.remove(zone_id);
        session.close_if_empty();
        removed
    }

    /// Copy session membership onto the zone flag, zone lock then session lock
    fn sync_zone(&self, zone_id: &str) -> Result<bool, CaptureZonesError> {
        self.zones
            .sync_koth_member(zone_id, |id| self.session.lock().members.contains(id))
    }

    fn release_zone(&self, zone_id: &str) {
        if let Err(e) = self.sync_zone(zone_id) {
            tracing::debug!(zone_id, error = %e, "KOTH member gone before release");
        }
    }

    pub fn members(&self) -> Vec<String> {
        self.session.lock().members.iter().cloned().collect()
    }

    pub fn is_member(&self, zone_id: &str) -> bool {
        self.session.lock().members.contains(zone_id)
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_running()
    }

    pub fn announce(&self) -> bool {
        self.session.lock().announce
    }

    /// Whether a running session has lasted `duration_seconds`
    pub fn expired(&self, now: DateTime<Utc>, duration_seconds: f64) -> bool {
        let session = self.session.lock();
        match session.started_at {
            Some(started) if session.is_running() => elapsed_seconds(started, now) >= duration_seconds,
            _ => false,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>, duration_seconds: f64) -> KothSnapshot {
        let session = self.session.lock();
        KothSnapshot {
            running: session.is_running(),
            members: session.members.iter().cloned().collect(),
            started_at: session.started_at,
            announce: session.announce,
            remaining_seconds: session
                .started_at
                .map(|started| (duration_seconds - elapsed_seconds(started, now)).max(0.0)),
        }
    }
}

fn elapsed_seconds(started: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - started).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CaptureState, Geometry, PlayerId, Position, Zone};
    use chrono::Duration;

    fn registry_with(ids: &[&str]) -> Arc<ZoneRegistry> {
        let registry = Arc::new(ZoneRegistry::new());
        for id in ids {
            registry
                .create(Zone {
                    id: id.to_string(),
                    name: id.to_string(),
                    world: "world".to_string(),
                    geometry: Geometry::Cuboid {
                        min: Position::new(0.0, 0.0, 0.0),
                        max: Position::new(8.0, 8.0, 8.0),
                    },
                    zone_type: ZoneType::KothEligible,
                    active: true,
                    min_players: 1,
                    max_players: None,
                    reward: 0.0,
                    created_at: Utc::now(),
                })
                .unwrap();
        }
        registry
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_start_resets_members_to_idle() {
        let registry = registry_with(&["z1", "z2"]);
        registry.force_capture("z1", PlayerId::from("Steve")).unwrap();
        let koth = KothScheduler::new(registry.clone());

        let joined = koth.start(&ids(&["z1", "z2"]), true, Utc::now()).unwrap();

        assert_eq!(joined, ids(&["z1", "z2"]));
        assert!(koth.is_running());
        assert!(koth.announce());
        let z1 = registry.get("z1").unwrap();
        assert_eq!(z1.state, CaptureState::Idle);
        assert!(z1.koth_member);
    }

    #[test]
    fn test_start_validation() {
        let registry = registry_with(&["z1"]);
        let koth = KothScheduler::new(registry.clone());

        assert!(matches!(koth.start(&[], true, Utc::now()), Err(CaptureZonesError::InvalidArgument { .. })));
        assert!(koth.start(&ids(&["z1", "missing"]), true, Utc::now()).is_err());
        assert!(koth.start(&ids(&["z1", "z1"]), true, Utc::now()).is_err());
        assert!(!koth.is_running());

        koth.start(&ids(&["z1"]), false, Utc::now()).unwrap();
        assert!(matches!(
            koth.start(&ids(&["z1"]), false, Utc::now()),
            Err(CaptureZonesError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_stop_unknown_member_is_not_found() {
        let registry = registry_with(&["z1"]);
        let koth = KothScheduler::new(registry);

        assert!(matches!(koth.stop("z1"), Err(CaptureZonesError::NotFound { .. })));
    }

    #[test]
    fn test_stop_all_tolerates_empty_session() {
        let registry = registry_with(&["z1", "z2"]);
        let koth = KothScheduler::new(registry.clone());

        assert!(koth.stop_all().is_empty());

        koth.start(&ids(&["z1", "z2"]), true, Utc::now()).unwrap();
        assert_eq!(koth.stop_all(), ids(&["z1", "z2"]));
        assert!(!koth.is_running());
        assert!(!registry.get("z1").unwrap().koth_member);
        assert!(koth.stop_all().is_empty());
    }

    #[test]
    fn test_unassign_last_member_ends_session() {
        let registry = registry_with(&["z1", "z2"]);
        let koth = KothScheduler::new(registry);

        assert!(koth.assign("z1", true, Utc::now()).unwrap());
        assert!(!koth.assign("z1", true, Utc::now()).unwrap());
        assert!(koth.is_running());

        assert!(!koth.assign("z2", false, Utc::now()).unwrap());
        assert!(koth.assign("z1", false, Utc::now()).unwrap());
        assert!(!koth.is_running());
        assert!(koth.snapshot(Utc::now(), 600.0).started_at.is_none());
    }

    #[test]
    fn test_expiry_and_remaining_time() {
        let registry = registry_with(&["z1"]);
        let koth = KothScheduler::new(registry);
        let start = Utc::now();
        koth.start(&ids(&["z1"]), true, start).unwrap();

        assert!(!koth.expired(start + Duration::seconds(30), 60.0));
        assert!(koth.expired(start + Duration::seconds(60), 60.0));

        let snapshot = koth.snapshot(start + Duration::seconds(45), 60.0);
        assert_eq!(snapshot.remaining_seconds, Some(15.0));
        assert_eq!(snapshot.members, ids(&["z1"]));
    }

    #[test]
    fn test_start_racing_stop_all_keeps_flags_in_sync() {
        let registry = registry_with(&["z1", "z2"]);
        let koth = KothScheduler::new(registry.clone());

        for _ in 0..2_000 {
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = koth.start(&ids(&["z1", "z2"]), false, Utc::now());
                });
                scope.spawn(|| {
                    koth.stop_all();
                });
                scope.spawn(|| {
                    let _ = koth.assign("z2", false, Utc::now());
                });
            });
            for id in ["z1", "z2"] {
                assert_eq!(registry.get(id).unwrap().koth_member, koth.is_member(id), "zone {}", id);
            }
            koth.stop_all();
        }
        assert!(!registry.get("z1").unwrap().koth_member);
    }

    #[test]
    fn test_delete_evicts_membership() {
        let registry = registry_with(&["z1", "z2"]);
        let koth = KothScheduler::new(registry.clone());
        koth.start(&ids(&["z1", "z2"]), false, Utc::now()).unwrap();

        registry.delete_with("z1", |_| {
            koth.evict("z1");
        })
        .unwrap();

        assert_eq!(koth.members(), ids(&["z2"]));
    }
}
