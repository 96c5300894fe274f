//! Live eligibility: projects the full transport universe down to the
//! subset usable right now, given account state and the travel-method
//! policy.
//!
//! The projection is published as an immutable [`Snapshot`] behind an
//! `Arc` and replaced wholesale on every refresh; searches keep whatever
//! snapshot they started with. Only the designated state-owner context
//! may read the live [`StateProvider`]; a refresh requested anywhere else
//! is silently deferred and the previous snapshot stays valid.

use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::{SearchConfig, TeleportItemPolicy};
use crate::coord::PackedPoint;
use crate::transports::{Skill, Transport, TransportType, TransportUniverse, SKILL_SLOTS};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum QuestState {
    NotStarted,
    InProgress,
    Finished,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VarDomain {
    Varbit,
    Varplayer,
}

/// Read-only window onto the host's volatile account state. Implementors
/// decide which execution context counts as the state owner.
pub trait StateProvider {
    fn is_logged_in(&self) -> bool;
    fn boosted_skill_level(&self, skill: Skill) -> i32;
    fn quest_state(&self, quest: &str) -> QuestState;
    fn var_value(&self, domain: VarDomain, id: i32) -> i32;
    fn carried_item_counts(&self) -> HashMap<i32, i32>;
    fn current_tick(&self) -> i32;
    fn current_thread_is_state_owner(&self) -> bool;
}

/// The currently-usable projection of the transport universe. Immutable;
/// cheap to share across search workers.
pub struct Snapshot {
    by_origin: HashMap<PackedPoint, Vec<Arc<Transport>>>,
    /// Player-anchored transports passing every check except items; the
    /// item filter is applied per query so a teleport refresh only has to
    /// swap the carried-item cache.
    teleport_candidates: Vec<Arc<Transport>>,
    item_counts: HashMap<i32, i32>,
    item_policy: TeleportItemPolicy,
}

impl Snapshot {
    fn empty(item_policy: TeleportItemPolicy) -> Self {
        Self {
            by_origin: HashMap::new(),
            teleport_candidates: Vec::new(),
            item_counts: HashMap::new(),
            item_policy,
        }
    }

    /// Usable transports leaving a fixed origin.
    pub fn at(&self, origin: PackedPoint) -> &[Arc<Transport>] {
        self.by_origin.get(&origin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn origins(&self) -> Vec<PackedPoint> {
        let mut v: Vec<PackedPoint> = self.by_origin.keys().copied().collect();
        v.sort_unstable();
        v
    }

    fn item_ok(&self, t: &Transport) -> bool {
        if t.transport_type == TransportType::TeleportationItem {
            match self.item_policy {
                TeleportItemPolicy::All | TeleportItemPolicy::AllNonConsumable => return true,
                _ => {}
            }
        }
        t.items_satisfied(&self.item_counts)
    }

    /// The player-anchored pool as usable at the given wilderness level:
    /// teleports with a lower ceiling than the current danger level are
    /// out, and the item requirement is checked against the cached
    /// carried items.
    pub fn teleports_for(&self, wilderness_level: i32) -> Vec<Arc<Transport>> {
        self.teleport_candidates
            .iter()
            .filter(|t| t.max_wilderness_level >= wilderness_level && self.item_ok(t))
            .cloned()
            .collect()
    }
}

/// Owner of the live projection; one per session.
pub struct Eligibility {
    universe: Arc<TransportUniverse>,
    config: SearchConfig,
    snapshot: Arc<Snapshot>,
}

impl Eligibility {
    pub fn new(universe: Arc<TransportUniverse>, config: SearchConfig) -> Self {
        let snapshot = Arc::new(Snapshot::empty(config.teleport_item_policy));
        Self { universe, config, snapshot }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Replaces the travel-method policy; takes effect on the next
    /// refresh.
    pub fn set_config(&mut self, config: SearchConfig) {
        self.config = config;
    }

    /// The snapshot a search should capture. Stable for the lifetime of
    /// that search even if a refresh happens concurrently.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Recomputes the whole projection from live state. No-op off the
    /// state-owner context: the stale snapshot remains valid and the
    /// refresh happens before the next search instead.
    pub fn refresh(&mut self, provider: &dyn StateProvider) {
        if !provider.current_thread_is_state_owner() {
            debug!("eligibility refresh deferred: not on the state-owner context");
            return;
        }
        if !provider.is_logged_in() {
            self.snapshot = Arc::new(Snapshot::empty(self.config.teleport_item_policy));
            debug!("eligibility refresh: logged out, empty snapshot");
            return;
        }

        let mut levels = [0i32; SKILL_SLOTS];
        for skill in Skill::ALL {
            levels[skill.index()] = provider.boosted_skill_level(skill);
        }
        let finished: BTreeSet<String> = self
            .universe
            .referenced_quests()
            .iter()
            .filter(|q| provider.quest_state(q) == QuestState::Finished)
            .cloned()
            .collect();
        let varbits: HashMap<i32, i32> = self
            .universe
            .referenced_varbits()
            .iter()
            .map(|&id| (id, provider.var_value(VarDomain::Varbit, id)))
            .collect();
        let varplayers: HashMap<i32, i32> = self
            .universe
            .referenced_varplayers()
            .iter()
            .map(|&id| (id, provider.var_value(VarDomain::Varplayer, id)))
            .collect();
        let now = provider.current_tick();
        let item_counts = provider.carried_item_counts();

        let usable = |t: &Transport| -> bool {
            for slot in 0..SKILL_SLOTS {
                if levels[slot] < t.skill_levels[slot] {
                    return false;
                }
            }
            if t.transport_type == TransportType::TeleportationItem {
                match self.config.teleport_item_policy {
                    TeleportItemPolicy::None => return false,
                    TeleportItemPolicy::AllNonConsumable if t.consumable => return false,
                    _ => {}
                }
            } else if !self.config.enabled(t.transport_type) {
                return false;
            }
            if !t.quests.iter().all(|q| finished.contains(q)) {
                return false;
            }
            let varbit_ok = t
                .varbits
                .iter()
                .all(|c| c.passes(varbits.get(&c.id).copied().unwrap_or(0), now));
            let varplayer_ok = t
                .varplayers
                .iter()
                .all(|c| c.passes(varplayers.get(&c.id).copied().unwrap_or(0), now));
            varbit_ok && varplayer_ok
        };

        let mut by_origin = HashMap::new();
        for (&origin, list) in self.universe.by_origin() {
            let passing: Vec<Arc<Transport>> =
                list.iter().filter(|t| usable(t)).cloned().collect();
            if !passing.is_empty() {
                by_origin.insert(origin, passing);
            }
        }
        let teleport_candidates: Vec<Arc<Transport>> = self
            .universe
            .teleports()
            .iter()
            .filter(|t| usable(t))
            .cloned()
            .collect();

        info!(
            "eligibility refreshed: {} origins, {} teleport candidates (of {} transports)",
            by_origin.len(),
            teleport_candidates.len(),
            self.universe.len()
        );
        self.snapshot = Arc::new(Snapshot {
            by_origin,
            teleport_candidates,
            item_counts,
            item_policy: self.config.teleport_item_policy,
        });
    }

    /// Cheap search-time refresh: re-reads only the carried-item cache so
    /// the player-anchored pool reflects items picked up or dropped since
    /// the last full refresh. Same owner-context deferral as [`refresh`].
    pub fn refresh_teleports(&mut self, provider: &dyn StateProvider) {
        if !provider.current_thread_is_state_owner() {
            debug!("teleport refresh deferred: not on the state-owner context");
            return;
        }
        let next = Snapshot {
            by_origin: self.snapshot.by_origin.clone(),
            teleport_candidates: self.snapshot.teleport_candidates.clone(),
            item_counts: provider.carried_item_counts(),
            item_policy: self.snapshot.item_policy,
        };
        self.snapshot = Arc::new(next);
    }
}
