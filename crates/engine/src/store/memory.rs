use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use tether_common::types::{
    DisplayInfo, EdgeKind, Profile, RelationshipEdge, SortDirection, Track,
};
use tether_common::{EdgeId, UserId};

use crate::identity::{IdentityDirectory, IdentityError, IdentityFuture};

use super::{EdgeScan, EdgeStore, InsertOutcome, StoreError, StoreFuture};

/// In-process implementation of both the edge store and the identity
/// directory, with the same slot uniqueness rules as the PostgreSQL schema.
///
/// Every operation takes the single state lock once, so each write is atomic
/// with respect to every other.
#[derive(Default)]
pub struct MemoryStore {
    /// Uses std::sync::Mutex because it is never held across await points.
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    edges: HashMap<EdgeId, RelationshipEdge>,
    /// Unordered pair -> connection-track edge.
    connection_slots: HashMap<(UserId, UserId), EdgeId>,
    /// Directed pair -> follow edge.
    following_slots: HashMap<(UserId, UserId), EdgeId>,
    profiles: BTreeMap<UserId, Profile>,
}

impl MemoryState {
    fn slots_mut(&mut self, track: Track) -> &mut HashMap<(UserId, UserId), EdgeId> {
        match track {
            Track::Connection => &mut self.connection_slots,
            Track::Following => &mut self.following_slots,
        }
    }

    fn remove(&mut self, id: EdgeId) -> Option<RelationshipEdge> {
        let edge = self.edges.remove(&id)?;
        let slots = self.slots_mut(edge.track());
        if slots.get(&edge.slot_key()) == Some(&id) {
            slots.remove(&edge.slot_key());
        }
        Some(edge)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile. Replaces any profile with the same id.
    pub fn insert_profile(&self, profile: Profile) {
        if let Ok(mut state) = self.state.lock() {
            state.profiles.insert(profile.id(), profile);
        }
    }

    pub fn profile(&self, id: UserId) -> Option<Profile> {
        self.state.lock().ok()?.profiles.get(&id).cloned()
    }

    /// Snapshot of every stored edge, in no particular order.
    pub fn edges(&self) -> Vec<RelationshipEdge> {
        self.state
            .lock()
            .map(|state| state.edges.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Store an edge without consulting the slot indexes. Only useful for
    /// reproducing corrupted state, e.g. a stray request next to a connection.
    pub fn force_insert(&self, edge: RelationshipEdge) {
        if let Ok(mut state) = self.state.lock() {
            state.edges.insert(edge.id, edge);
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned("memory store".into()))
    }

    fn lock_identities(&self) -> Result<MutexGuard<'_, MemoryState>, IdentityError> {
        self.state
            .lock()
            .map_err(|_| IdentityError::Backend("memory store lock poisoned".into()))
    }

    fn sorted_matches(state: &MemoryState, scan: &EdgeScan) -> Vec<RelationshipEdge> {
        let mut matched: Vec<RelationshipEdge> = state
            .edges
            .values()
            .filter(|edge| scan.matches(edge))
            .cloned()
            .collect();

        matched.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if scan.order == SortDirection::Desc {
            matched.reverse();
        }
        matched
    }
}

impl EdgeStore for MemoryStore {
    fn find_edge<'a>(
        &'a self,
        initiator: UserId,
        target: UserId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .edges
                .values()
                .find(|e| e.initiator == initiator && e.target == target && kinds.contains(&e.kind))
                .cloned())
        })
    }

    fn find_between<'a>(
        &'a self,
        a: UserId,
        b: UserId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state
                .edges
                .values()
                .filter(|e| e.touches(a) && e.touches(b) && kinds.contains(&e.kind))
                .min_by_key(|e| (e.created_at, e.id))
                .cloned())
        })
    }

    fn insert_if_absent<'a>(
        &'a self,
        edge: &'a RelationshipEdge,
    ) -> StoreFuture<'a, InsertOutcome> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let key = edge.slot_key();

            let slots = state.slots_mut(edge.track());
            if slots.contains_key(&key) {
                return Ok(InsertOutcome::Duplicate);
            }
            slots.insert(key, edge.id);
            state.edges.insert(edge.id, edge.clone());

            Ok(InsertOutcome::Inserted(edge.clone()))
        })
    }

    fn transition<'a>(
        &'a self,
        initiator: UserId,
        target: UserId,
        from: EdgeKind,
        to: EdgeKind,
        stamped_at: Option<DateTime<Utc>>,
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            if !from.can_transition_to(to) {
                return Err(StoreError::IllegalTransition { from, to });
            }

            let mut state = self.lock()?;
            let edge = state
                .edges
                .values_mut()
                .find(|e| e.initiator == initiator && e.target == target && e.kind == from);

            Ok(edge.map(|edge| {
                edge.kind = to;
                if let Some(stamped_at) = stamped_at {
                    edge.created_at = stamped_at;
                }
                edge.clone()
            }))
        })
    }

    fn delete_edge<'a>(
        &'a self,
        id: EdgeId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            let mut state = self.lock()?;
            let eligible = state
                .edges
                .get(&id)
                .is_some_and(|edge| kinds.contains(&edge.kind));

            if !eligible {
                return Ok(None);
            }
            Ok(state.remove(id))
        })
    }

    fn claim_counters<'a>(&'a self, id: EdgeId) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut state = self.lock()?;
            match state.edges.get_mut(&id) {
                Some(edge) if edge.kind == EdgeKind::Connected && !edge.counters_applied => {
                    edge.counters_applied = true;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn scan<'a>(&'a self, scan: &'a EdgeScan) -> StoreFuture<'a, Vec<RelationshipEdge>> {
        Box::pin(async move {
            let state = self.lock()?;
            let matched = Self::sorted_matches(&state, scan);
            let limit = scan.limit.unwrap_or(usize::MAX);

            Ok(matched.into_iter().skip(scan.offset).take(limit).collect())
        })
    }

    fn count<'a>(&'a self, scan: &'a EdgeScan) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.edges.values().filter(|e| scan.matches(e)).count() as u64)
        })
    }

    fn connected_among<'a>(
        &'a self,
        subject: UserId,
        candidates: &'a [UserId],
    ) -> StoreFuture<'a, HashSet<UserId>> {
        Box::pin(async move {
            let state = self.lock()?;
            let wanted: HashSet<UserId> = candidates.iter().copied().collect();
            Ok(state
                .edges
                .values()
                .filter(|e| e.kind == EdgeKind::Connected)
                .filter_map(|e| e.other_party(subject))
                .filter(|other| wanted.contains(other))
                .collect())
        })
    }

    fn unclaimed_connections<'a>(
        &'a self,
        limit: u32,
    ) -> StoreFuture<'a, Vec<RelationshipEdge>> {
        Box::pin(async move {
            let state = self.lock()?;
            let mut unclaimed: Vec<RelationshipEdge> = state
                .edges
                .values()
                .filter(|e| e.kind == EdgeKind::Connected && !e.counters_applied)
                .cloned()
                .collect();
            unclaimed.sort_by_key(|e| (e.created_at, e.id));
            unclaimed.truncate(limit as usize);
            Ok(unclaimed)
        })
    }
}

impl IdentityDirectory for MemoryStore {
    fn exists<'a>(&'a self, id: UserId) -> IdentityFuture<'a, bool> {
        Box::pin(async move { Ok(self.lock_identities()?.profiles.contains_key(&id)) })
    }

    fn increment_connection_count<'a>(
        &'a self,
        id: UserId,
        delta: i64,
    ) -> IdentityFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock_identities()?;
            let profile = state
                .profiles
                .get_mut(&id)
                .ok_or(IdentityError::Missing(id))?;
            profile.connection_count = (profile.connection_count + delta).max(0);
            Ok(())
        })
    }

    fn set_connection_count<'a>(&'a self, id: UserId, count: i64) -> IdentityFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock_identities()?;
            let profile = state
                .profiles
                .get_mut(&id)
                .ok_or(IdentityError::Missing(id))?;
            profile.connection_count = count;
            Ok(())
        })
    }

    fn batch_fetch_display_info<'a>(
        &'a self,
        ids: &'a [UserId],
        name_filter: Option<&'a str>,
    ) -> IdentityFuture<'a, HashMap<UserId, DisplayInfo>> {
        Box::pin(async move {
            let state = self.lock_identities()?;
            Ok(ids
                .iter()
                .filter_map(|id| state.profiles.get(id))
                .filter(|p| name_filter.map_or(true, |f| p.display.matches_name(f)))
                .map(|p| (p.id(), p.display.clone()))
                .collect())
        })
    }

    fn list_identities<'a>(
        &'a self,
        after: Option<UserId>,
        limit: u32,
    ) -> IdentityFuture<'a, Vec<(UserId, i64)>> {
        Box::pin(async move {
            let state = self.lock_identities()?;
            Ok(state
                .profiles
                .values()
                .filter(|p| after.map_or(true, |a| p.id() > a))
                .take(limit as usize)
                .map(|p| (p.id(), p.connection_count))
                .collect())
        })
    }
}
