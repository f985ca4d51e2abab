//! Zone registry and the per-zone capture state machine
//!
//! Each zone lives behind its own mutex. The registry map lock is only held
//! long enough to look up or insert a slot, never while a zone is mutated,
//! except by `snapshot`, which takes every zone lock in id order.

use super::validation::{validate_geometry, validate_zone_id};
use crate::contract::{CaptureState, CaptureZonesError, PlayerId, Zone, ZoneSnapshot, ZoneType};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Zone definition plus runtime state, guarded by the zone lock
#[derive(Debug)]
pub struct ZoneEntry {
    pub zone: Zone,
    pub state: CaptureState,
    pub koth_member: bool,
    /// Set by delete while holding the lock; late holders of the slot see NotFound
    removed: bool,
}

impl ZoneEntry {
    fn snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            zone: self.zone.clone(),
            state: self.state.clone(),
            koth_member: self.koth_member,
        }
    }
}

/// Who is driving an occupancy tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDriver {
    /// Plain occupancy polling; skips KOTH members
    Regular,
    /// KOTH scheduler; only touches KOTH members
    Koth,
}

/// Contest qualification and progress rule, resolved per zone from config
#[derive(Debug, Clone, PartialEq)]
pub struct ContestRule {
    /// Seconds of uninterrupted qualifying occupancy needed to capture
    pub capture_seconds: f64,
    /// Lose progress gradually instead of all at once when qualification is lost
    pub decay_when_empty: bool,
    /// Only a single occupant may contest
    pub require_exclusive: bool,
}

impl Default for ContestRule {
    fn default() -> Self {
        Self {
            capture_seconds: 30.0,
            decay_when_empty: true,
            require_exclusive: false,
        }
    }
}

impl ContestRule {
    /// Whether `occupants` may contest `zone` under this rule
    pub fn qualifies(&self, zone: &Zone, occupants: &[PlayerId]) -> bool {
        let count = occupants.len() as u32;
        if count == 0 || !zone.active || !zone.zone_type.is_contestable() {
            return false;
        }
        if count < zone.min_players {
            return false;
        }
        if zone.max_players.is_some_and(|max| count > max) {
            return false;
        }
        !(self.require_exclusive && count != 1)
    }
}

/// Zone definition before and after an attribute change
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneUpdate {
    pub previous: Zone,
    pub current: Zone,
}

/// Result of one occupancy tick on one zone
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Unchanged,
    ContestStarted { claimant: PlayerId },
    ClaimantChanged { claimant: PlayerId },
    Progressed { progress: f64 },
    Decayed { progress: f64 },
    /// Contest lost all progress, zone is IDLE again
    Released,
    Captured { owner: PlayerId, zone: Zone },
}

/// Canonical store of zones and their capture states
#[derive(Default)]
pub struct ZoneRegistry {
    zones: RwLock<BTreeMap<String, Arc<Mutex<ZoneEntry>>>>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validated zone in `IDLE`
    pub fn create(&self, zone: Zone) -> Result<ZoneSnapshot, CaptureZonesError> {
        validate_zone_id(&zone.id)?;
        validate_geometry(&zone.geometry)?;
        self.insert(zone)
    }

    /// Insert a zone loaded from persistence without re-validating geometry
    pub fn restore(&self, zone: Zone) -> Result<ZoneSnapshot, CaptureZonesError> {
        if let Err(e) = validate_geometry(&zone.geometry) {
            tracing::warn!(zone_id = %zone.id, error = %e, "restored zone has invalid geometry");
        }
        self.insert(zone)
    }

    fn insert(&self, zone: Zone) -> Result<ZoneSnapshot, CaptureZonesError> {
        let mut zones = self.zones.write();
        if zones.contains_key(&zone.id) {
            return Err(CaptureZonesError::DuplicateId { id: zone.id });
        }
        let entry = ZoneEntry {
            zone,
            state: CaptureState::Idle,
            koth_member: false,
            removed: false,
        };
        let snapshot = entry.snapshot();
        zones.insert(snapshot.zone.id.clone(), Arc::new(Mutex::new(entry)));
        Ok(snapshot)
    }

    /// Remove a zone. `on_removed` runs while the zone lock is still held.
    pub fn delete_with<F>(&self, zone_id: &str, on_removed: F) -> Result<Zone, CaptureZonesError>
    where
        F: FnOnce(&ZoneEntry),
    {
        let slot = self
            .zones
            .write()
            .remove(zone_id)
            .ok_or_else(|| CaptureZonesError::zone_not_found(zone_id))?;
        let mut entry = slot.lock();
        entry.removed = true;
        on_removed(&entry);
        Ok(entry.zone.clone())
    }

    fn slot(&self, zone_id: &str) -> Result<Arc<Mutex<ZoneEntry>>, CaptureZonesError> {
        self.zones
            .read()
            .get(zone_id)
            .cloned()
            .ok_or_else(|| CaptureZonesError::zone_not_found(zone_id))
    }

    /// Run `f` on a zone under its lock
    pub fn with_zone<R, F>(&self, zone_id: &str, f: F) -> Result<R, CaptureZonesError>
    where
        F: FnOnce(&mut ZoneEntry) -> Result<R, CaptureZonesError>,
    {
        let slot = self.slot(zone_id)?;
        let mut entry = slot.lock();
        if entry.removed {
            return Err(CaptureZonesError::zone_not_found(zone_id));
        }
        f(&mut entry)
    }

    pub fn contains(&self, zone_id: &str) -> bool {
        self.zones.read().contains_key(zone_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.zones.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, zone_id: &str) -> Option<ZoneSnapshot> {
        self.with_zone(zone_id, |entry| Ok(entry.snapshot())).ok()
    }

    /// Consistent view of every zone, ordered by id
    pub fn snapshot(&self) -> Vec<ZoneSnapshot> {
        let zones = self.zones.read();
        let guards: Vec<_> = zones.values().map(|slot| slot.lock()).collect();
        guards.iter().map(|entry| entry.snapshot()).collect()
    }

    // ===== Capture transitions =====

    /// Set `CAPTURED(owner)` regardless of the current state
    pub fn force_capture(&self, zone_id: &str, owner: PlayerId) -> Result<Zone, CaptureZonesError> {
        self.with_zone(zone_id, |entry| {
            tracing::info!(zone_id, from = %entry.state, owner = %owner, "forcing capture");
            entry.state = CaptureState::Captured { owner };
            Ok(entry.zone.clone())
        })
    }

    /// `CONTESTED|CAPTURED -> STOPPED(reason)`. Returns false when already IDLE or STOPPED.
    pub fn stop_capture(&self, zone_id: &str, reason: &str) -> Result<bool, CaptureZonesError> {
        self.with_zone(zone_id, |entry| match entry.state {
            CaptureState::Idle | CaptureState::Stopped { .. } => Ok(false),
            _ => {
                tracing::info!(zone_id, from = %entry.state, reason, "stopping capture");
                entry.state = CaptureState::Stopped {
                    reason: reason.to_string(),
                };
                Ok(true)
            }
        })
    }

    /// Any state -> `IDLE`. Returns false when the zone was already IDLE.
    pub fn reset_point(&self, zone_id: &str) -> Result<bool, CaptureZonesError> {
        self.with_zone(zone_id, |entry| Ok(Self::reset_entry(entry)))
    }

    /// Like `reset_point`, but a zone restored with invalid geometry fails
    /// with InvalidGeometry and keeps its state. Used by bulk resets so
    /// corrupt records show up in the per-zone outcomes.
    pub fn reset_valid_point(&self, zone_id: &str) -> Result<bool, CaptureZonesError> {
        self.with_zone(zone_id, |entry| {
            validate_geometry(&entry.zone.geometry)?;
            Ok(Self::reset_entry(entry))
        })
    }

    fn reset_entry(entry: &mut ZoneEntry) -> bool {
        if entry.state.is_idle() {
            return false;
        }
        entry.state = CaptureState::Idle;
        true
    }

    /// Align the zone's KOTH flag with `is_member`, evaluated under the zone lock.
    ///
    /// Entering resets the zone to `IDLE`. Returns the flag now set.
    pub fn sync_koth_member<F>(&self, zone_id: &str, is_member: F) -> Result<bool, CaptureZonesError>
    where
        F: FnOnce(&str) -> bool,
    {
        self.with_zone(zone_id, |entry| {
            let member = is_member(&entry.zone.id);
            if member && !entry.koth_member {
                Self::reset_entry(entry);
            }
            entry.koth_member = member;
            Ok(member)
        })
    }

    // ===== Attribute updates =====

    /// Apply `f` to a zone's definition, returning the before and after
    pub fn update<F>(&self, zone_id: &str, f: F) -> Result<ZoneUpdate, CaptureZonesError>
    where
        F: FnOnce(&mut ZoneEntry) -> Result<(), CaptureZonesError>,
    {
        self.with_zone(zone_id, |entry| {
            let previous = entry.zone.clone();
            f(entry)?;
            Ok(ZoneUpdate {
                previous,
                current: entry.zone.clone(),
            })
        })
    }

    /// Undo an update unless the zone was changed again since
    pub fn revert(&self, update: ZoneUpdate) -> bool {
        let zone_id = update.current.id.clone();
        self.with_zone(&zone_id, |entry| {
            if entry.zone != update.current {
                return Ok(false);
            }
            entry.zone = update.previous;
            Ok(true)
        })
        .unwrap_or(false)
    }

    /// Shop-only is refused while the zone is in a KOTH session
    pub fn set_type(&self, zone_id: &str, zone_type: ZoneType) -> Result<ZoneUpdate, CaptureZonesError> {
        self.update(zone_id, |entry| {
            if zone_type == ZoneType::ShopOnly && entry.koth_member {
                return Err(CaptureZonesError::InvalidState {
                    reason: format!("zone '{}' is a KOTH member", entry.zone.id),
                });
            }
            entry.zone.zone_type = zone_type;
            Ok(())
        })
    }

    pub fn set_active(&self, zone_id: &str, active: bool) -> Result<ZoneUpdate, CaptureZonesError> {
        self.update(zone_id, |entry| {
            entry.zone.active = active;
            Ok(())
        })
    }

    pub fn set_player_limits(
        &self,
        zone_id: &str,
        min_players: u32,
        max_players: u32,
    ) -> Result<ZoneUpdate, CaptureZonesError> {
        self.update(zone_id, |entry| {
            entry.zone.min_players = min_players;
            entry.zone.max_players = Some(max_players);
            Ok(())
        })
    }

    // ===== Occupancy =====

    /// Advance the capture state machine of one zone by `dt_seconds`
    pub fn advance(
        &self,
        zone_id: &str,
        occupants: &[PlayerId],
        driver: CaptureDriver,
        rule: &ContestRule,
        dt_seconds: f64,
    ) -> Result<TickOutcome, CaptureZonesError> {
        self.with_zone(zone_id, |entry| {
            let driven_by_koth = driver == CaptureDriver::Koth;
            if entry.koth_member != driven_by_koth {
                return Ok(TickOutcome::Unchanged);
            }
            if !entry.zone.active || !entry.zone.zone_type.is_contestable() {
                return Ok(TickOutcome::Unchanged);
            }

            let qualifies = rule.qualifies(&entry.zone, occupants);
            let step = dt_seconds / rule.capture_seconds.max(f64::EPSILON);

            let outcome = match &mut entry.state {
                CaptureState::Captured { .. } | CaptureState::Stopped { .. } => TickOutcome::Unchanged,
                CaptureState::Idle => match occupants.first() {
                    Some(first) if qualifies => {
                        entry.state = CaptureState::Contested {
                            claimant: first.clone(),
                            progress: 0.0,
                        };
                        TickOutcome::ContestStarted {
                            claimant: first.clone(),
                        }
                    }
                    _ => TickOutcome::Unchanged,
                },
                CaptureState::Contested { claimant, progress } => {
                    if qualifies && occupants.contains(claimant) {
                        *progress += step;
                        if *progress >= 1.0 {
                            let owner = claimant.clone();
                            entry.state = CaptureState::Captured {
                                owner: owner.clone(),
                            };
                            TickOutcome::Captured {
                                owner,
                                zone: entry.zone.clone(),
                            }
                        } else {
                            TickOutcome::Progressed { progress: *progress }
                        }
                    } else if let (true, Some(first)) = (qualifies, occupants.first()) {
                        *claimant = first.clone();
                        *progress = 0.0;
                        TickOutcome::ClaimantChanged {
                            claimant: first.clone(),
                        }
                    } else if rule.decay_when_empty && *progress - step > 0.0 {
                        *progress -= step;
                        TickOutcome::Decayed { progress: *progress }
                    } else {
                        entry.state = CaptureState::Idle;
                        TickOutcome::Released
                    }
                }
            };

            if outcome != TickOutcome::Unchanged {
                tracing::debug!(zone_id, state = %entry.state, "capture tick");
            }
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Geometry, Position};

    fn zone(id: &str) -> Zone {
        Zone {
            id: id.to_string(),
            name: id.to_string(),
            world: "world".to_string(),
            geometry: Geometry::Point {
                center: Position::new(0.0, 64.0, 0.0),
                radius_chunks: 2,
            },
            zone_type: ZoneType::CapturePoint,
            active: true,
            min_players: 1,
            max_players: None,
            reward: 50.0,
            created_at: chrono::Utc::now(),
        }
    }

    fn players(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|n| PlayerId::from(*n)).collect()
    }

    fn rule(capture_seconds: f64) -> ContestRule {
        ContestRule {
            capture_seconds,
            ..ContestRule::default()
        }
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_geometry() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();

        assert!(matches!(
            registry.create(zone("A1")),
            Err(CaptureZonesError::DuplicateId { .. })
        ));

        let mut flat = zone("B1");
        flat.geometry = Geometry::Point {
            center: Position::new(0.0, 0.0, 0.0),
            radius_chunks: 0,
        };
        assert!(matches!(
            registry.create(flat),
            Err(CaptureZonesError::InvalidGeometry { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_owner_only_when_captured() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();

        registry.force_capture("A1", PlayerId::from("Steve")).unwrap();
        let state = registry.get("A1").unwrap().state;
        assert_eq!(state.owner(), Some(&PlayerId::from("Steve")));

        assert!(registry.stop_capture("A1", "admin").unwrap());
        let state = registry.get("A1").unwrap().state;
        assert_eq!(state, CaptureState::Stopped { reason: "admin".to_string() });
        assert!(state.owner().is_none());
    }

    #[test]
    fn test_stop_is_noop_on_idle_and_stopped() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();

        assert!(!registry.stop_capture("A1", "admin").unwrap());
        registry.force_capture("A1", PlayerId::from("Steve")).unwrap();
        assert!(registry.stop_capture("A1", "first").unwrap());
        assert!(!registry.stop_capture("A1", "second").unwrap());

        let state = registry.get("A1").unwrap().state;
        assert_eq!(state, CaptureState::Stopped { reason: "first".to_string() });
    }

    #[test]
    fn test_reset_is_idempotent() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        registry.force_capture("A1", PlayerId::from("Steve")).unwrap();

        assert!(registry.reset_point("A1").unwrap());
        assert!(!registry.reset_point("A1").unwrap());
        assert_eq!(registry.get("A1").unwrap().state, CaptureState::Idle);
    }

    #[test]
    fn test_delete_runs_hook_and_frees_id() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        registry.sync_koth_member("A1", |_| true).unwrap();

        let mut saw_member = false;
        registry
            .delete_with("A1", |entry| saw_member = entry.koth_member)
            .unwrap();
        assert!(saw_member);
        assert!(registry.get("A1").is_none());
        assert!(matches!(
            registry.delete_with("A1", |_| {}),
            Err(CaptureZonesError::NotFound { .. })
        ));

        registry.create(zone("A1")).unwrap();
        assert!(!registry.get("A1").unwrap().koth_member);
    }

    #[test]
    fn test_occupancy_captures_after_capture_time() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        let occupants = players(&["Steve"]);
        let rule = rule(2.0);

        let outcome = registry
            .advance("A1", &occupants, CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::ContestStarted { claimant: PlayerId::from("Steve") });

        let outcome = registry
            .advance("A1", &occupants, CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Progressed { progress: 0.5 });

        let outcome = registry
            .advance("A1", &occupants, CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert!(matches!(outcome, TickOutcome::Captured { ref owner, .. } if owner.as_str() == "Steve"));

        // terminal until reset
        let outcome = registry
            .advance("A1", &players(&["Alex"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged);
    }

    #[test]
    fn test_player_limits_gate_contest() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        registry.set_player_limits("A1", 2, 3).unwrap();
        let rule = rule(10.0);

        let outcome = registry
            .advance("A1", &players(&["Steve"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged);

        let outcome = registry
            .advance("A1", &players(&["a", "b", "c", "d"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged);

        let outcome = registry
            .advance("A1", &players(&["a", "b"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::ContestStarted { claimant: PlayerId::from("a") });
    }

    #[test]
    fn test_claimant_leaving_restarts_progress() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        let rule = rule(4.0);

        registry
            .advance("A1", &players(&["Steve", "Alex"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        registry
            .advance("A1", &players(&["Steve", "Alex"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        let outcome = registry
            .advance("A1", &players(&["Alex"]), CaptureDriver::Regular, &rule, 1.0)
            .unwrap();
        assert_eq!(outcome, TickOutcome::ClaimantChanged { claimant: PlayerId::from("Alex") });
        assert_eq!(
            registry.get("A1").unwrap().state,
            CaptureState::Contested { claimant: PlayerId::from("Alex"), progress: 0.0 }
        );
    }

    #[test]
    fn test_empty_zone_decays_then_releases() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        let rule = rule(4.0);
        let steve = players(&["Steve"]);

        registry.advance("A1", &steve, CaptureDriver::Regular, &rule, 1.0).unwrap();
        registry.advance("A1", &steve, CaptureDriver::Regular, &rule, 2.0).unwrap();

        let outcome = registry.advance("A1", &[], CaptureDriver::Regular, &rule, 1.0).unwrap();
        assert_eq!(outcome, TickOutcome::Decayed { progress: 0.25 });

        let outcome = registry.advance("A1", &[], CaptureDriver::Regular, &rule, 1.0).unwrap();
        assert_eq!(outcome, TickOutcome::Released);
        assert_eq!(registry.get("A1").unwrap().state, CaptureState::Idle);
    }

    #[test]
    fn test_driver_gating_by_koth_membership() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        registry.sync_koth_member("A1", |_| true).unwrap();
        let steve = players(&["Steve"]);
        let rule = rule(10.0);

        let outcome = registry.advance("A1", &steve, CaptureDriver::Regular, &rule, 1.0).unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged);

        let outcome = registry.advance("A1", &steve, CaptureDriver::Koth, &rule, 1.0).unwrap();
        assert!(matches!(outcome, TickOutcome::ContestStarted { .. }));
    }

    #[test]
    fn test_shop_only_and_inactive_never_contest() {
        let registry = ZoneRegistry::new();
        registry.create(zone("S1")).unwrap();
        registry.create(zone("A1")).unwrap();
        registry.set_type("S1", ZoneType::ShopOnly).unwrap();
        registry.set_active("A1", false).unwrap();
        let steve = players(&["Steve"]);
        let rule = rule(10.0);

        for id in ["S1", "A1"] {
            let outcome = registry.advance(id, &steve, CaptureDriver::Regular, &rule, 1.0).unwrap();
            assert_eq!(outcome, TickOutcome::Unchanged);
        }
    }

    #[test]
    fn test_revert_skips_newer_changes() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();

        let update = registry.set_active("A1", false).unwrap();
        assert!(registry.revert(update));
        assert!(registry.get("A1").unwrap().zone.active);

        let stale = registry.set_player_limits("A1", 2, 4).unwrap();
        registry.set_player_limits("A1", 3, 5).unwrap();
        assert!(!registry.revert(stale));
        assert_eq!(registry.get("A1").unwrap().zone.min_players, 3);
    }

    #[test]
    fn test_koth_member_cannot_become_shop() {
        let registry = ZoneRegistry::new();
        registry.create(zone("A1")).unwrap();
        registry.sync_koth_member("A1", |_| true).unwrap();

        assert!(matches!(
            registry.set_type("A1", ZoneType::ShopOnly),
            Err(CaptureZonesError::InvalidState { .. })
        ));
        assert_eq!(registry.get("A1").unwrap().zone.zone_type, ZoneType::CapturePoint);
    }

    #[test]
    fn test_snapshot_sorted_by_id() {
        let registry = ZoneRegistry::new();
        registry.create(zone("b")).unwrap();
        registry.create(zone("a")).unwrap();

        let ids: Vec<String> = registry.snapshot().into_iter().map(|s| s.zone.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
