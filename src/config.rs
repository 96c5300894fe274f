use std::collections::BTreeMap;
use std::env;

use crate::transports::TransportType;

/// Policy for item-based teleports, which get four levels instead of a
/// plain on/off toggle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TeleportItemPolicy {
    /// Usable without checking carried items.
    All,
    /// Usable only when the item requirement is met from carried items.
    Inventory,
    /// Usable without an item check, but consumable teleports excluded.
    AllNonConsumable,
    /// Category disabled.
    None,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Per-category enable flags; categories not present default to on.
    pub enabled: BTreeMap<TransportType, bool>,
    pub teleport_item_policy: TeleportItemPolicy,
    pub avoid_wilderness: bool,
    /// Wall-clock budget for one search.
    pub cutoff_millis: u64,
    /// Worker threads for parallel data loading.
    pub threads: Option<usize>,
    pub log_level: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: BTreeMap::new(),
            teleport_item_policy: TeleportItemPolicy::Inventory,
            avoid_wilderness: true,
            cutoff_millis: 1_500,
            threads: None,
            log_level: None,
        }
    }
}

impl SearchConfig {
    pub fn enabled(&self, kind: TransportType) -> bool {
        self.enabled.get(&kind).copied().unwrap_or(true)
    }

    pub fn set_enabled(&mut self, kind: TransportType, on: bool) {
        self.enabled.insert(kind, on);
    }

    /// Overlays `NAVROUTE_*` environment variables onto this config; env
    /// wins over whatever the caller set programmatically.
    pub fn apply_env(&mut self) {
        if let Some(ms) = env::var("NAVROUTE_CUTOFF_MS").ok().and_then(|s| s.parse().ok()) {
            self.cutoff_millis = ms;
        }
        if let Ok(v) = env::var("NAVROUTE_AVOID_WILDERNESS") {
            self.avoid_wilderness = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(n) = env::var("NAVROUTE_THREADS").ok().and_then(|s| s.parse().ok()) {
            self.threads = Some(n);
        }
        if let Ok(v) = env::var("NAVROUTE_LOG_LEVEL") {
            self.log_level = Some(v);
        }
        if let Ok(list) = env::var("NAVROUTE_DISABLED") {
            for stem in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if let Some(kind) = TransportType::from_file_stem(stem) {
                    self.set_enabled(kind, false);
                }
            }
        }
        if let Ok(v) = env::var("NAVROUTE_TELEPORT_ITEMS") {
            self.teleport_item_policy = match v.to_ascii_lowercase().as_str() {
                "all" => TeleportItemPolicy::All,
                "inventory" => TeleportItemPolicy::Inventory,
                "all_non_consumable" => TeleportItemPolicy::AllNonConsumable,
                "none" => TeleportItemPolicy::None,
                _ => self.teleport_item_policy,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_default_to_enabled() {
        let mut cfg = SearchConfig::default();
        assert!(cfg.enabled(TransportType::FairyRing));
        cfg.set_enabled(TransportType::FairyRing, false);
        assert!(!cfg.enabled(TransportType::FairyRing));
        assert!(cfg.enabled(TransportType::Boat));
    }

    #[test]
    fn env_overlay_overrides_fields() {
        env::set_var("NAVROUTE_CUTOFF_MS", "250");
        env::set_var("NAVROUTE_AVOID_WILDERNESS", "false");
        env::set_var("NAVROUTE_DISABLED", "canoes, charter_ships");
        env::set_var("NAVROUTE_TELEPORT_ITEMS", "none");

        let mut cfg = SearchConfig::default();
        cfg.apply_env();
        assert_eq!(cfg.cutoff_millis, 250);
        assert!(!cfg.avoid_wilderness);
        assert!(!cfg.enabled(TransportType::Canoe));
        assert!(!cfg.enabled(TransportType::CharterShip));
        assert!(cfg.enabled(TransportType::Ship));
        assert_eq!(cfg.teleport_item_policy, TeleportItemPolicy::None);

        env::remove_var("NAVROUTE_CUTOFF_MS");
        env::remove_var("NAVROUTE_AVOID_WILDERNESS");
        env::remove_var("NAVROUTE_DISABLED");
        env::remove_var("NAVROUTE_TELEPORT_ITEMS");
    }
}
