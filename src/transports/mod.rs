//! Transport model: conditional directed edges between world points, plus
//! the loader that turns declarative row files into the immutable
//! transport universe the eligibility layer projects from.

use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::coord::{PackedPoint, UNDEFINED};

pub mod parse;
pub mod permutation;

pub use parse::TransportRow;

/// Placeholder endpoint carried by hub-network legs before pairing. Never
/// appears on a materialized edge.
pub const HUB_PLACEHOLDER: PackedPoint = -2;

/// Ticks per minute of game time, for cooldown variable checks.
pub const TICKS_PER_MINUTE: i32 = 100;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Skill {
    Attack,
    Defence,
    Strength,
    Hitpoints,
    Ranged,
    Prayer,
    Magic,
    Cooking,
    Woodcutting,
    Fletching,
    Fishing,
    Firemaking,
    Crafting,
    Smithing,
    Mining,
    Herblore,
    Agility,
    Thieving,
    Slayer,
    Farming,
    Runecraft,
    Hunter,
    Construction,
    // pseudo-skill slots
    TotalLevel,
    CombatLevel,
    QuestPoints,
}

pub const SKILL_SLOTS: usize = 26;

impl Skill {
    pub const ALL: [Skill; SKILL_SLOTS] = [
        Skill::Attack,
        Skill::Defence,
        Skill::Strength,
        Skill::Hitpoints,
        Skill::Ranged,
        Skill::Prayer,
        Skill::Magic,
        Skill::Cooking,
        Skill::Woodcutting,
        Skill::Fletching,
        Skill::Fishing,
        Skill::Firemaking,
        Skill::Crafting,
        Skill::Smithing,
        Skill::Mining,
        Skill::Herblore,
        Skill::Agility,
        Skill::Thieving,
        Skill::Slayer,
        Skill::Farming,
        Skill::Runecraft,
        Skill::Hunter,
        Skill::Construction,
        Skill::TotalLevel,
        Skill::CombatLevel,
        Skill::QuestPoints,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&s| s == self).unwrap_or(0)
    }

    pub fn name(self) -> &'static str {
        match self {
            Skill::Attack => "ATTACK",
            Skill::Defence => "DEFENCE",
            Skill::Strength => "STRENGTH",
            Skill::Hitpoints => "HITPOINTS",
            Skill::Ranged => "RANGED",
            Skill::Prayer => "PRAYER",
            Skill::Magic => "MAGIC",
            Skill::Cooking => "COOKING",
            Skill::Woodcutting => "WOODCUTTING",
            Skill::Fletching => "FLETCHING",
            Skill::Fishing => "FISHING",
            Skill::Firemaking => "FIREMAKING",
            Skill::Crafting => "CRAFTING",
            Skill::Smithing => "SMITHING",
            Skill::Mining => "MINING",
            Skill::Herblore => "HERBLORE",
            Skill::Thieving => "THIEVING",
            Skill::Agility => "AGILITY",
            Skill::Slayer => "SLAYER",
            Skill::Farming => "FARMING",
            Skill::Runecraft => "RUNECRAFT",
            Skill::Hunter => "HUNTER",
            Skill::Construction => "CONSTRUCTION",
            Skill::TotalLevel => "TOTAL_LEVEL",
            Skill::CombatLevel => "COMBAT_LEVEL",
            Skill::QuestPoints => "QUEST_POINTS",
        }
    }

    pub fn from_name(name: &str) -> Option<Skill> {
        let upper = name.trim().to_ascii_uppercase().replace(' ', "_");
        Skill::ALL.iter().copied().find(|s| s.name() == upper)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TransportType {
    Transport,
    AgilityShortcut,
    GrappleShortcut,
    Boat,
    Canoe,
    CharterShip,
    Ship,
    FairyRing,
    GnomeGlider,
    HotAirBalloon,
    Minecart,
    Quetzal,
    SpiritTree,
    TeleportationLever,
    TeleportationMinigame,
    TeleportationPortal,
    TeleportationItem,
    TeleportationSpell,
    WildernessObelisk,
    MagicCarpet,
}

impl TransportType {
    pub const ALL: [TransportType; 20] = [
        TransportType::Transport,
        TransportType::AgilityShortcut,
        TransportType::GrappleShortcut,
        TransportType::Boat,
        TransportType::Canoe,
        TransportType::CharterShip,
        TransportType::Ship,
        TransportType::FairyRing,
        TransportType::GnomeGlider,
        TransportType::HotAirBalloon,
        TransportType::Minecart,
        TransportType::Quetzal,
        TransportType::SpiritTree,
        TransportType::TeleportationLever,
        TransportType::TeleportationMinigame,
        TransportType::TeleportationPortal,
        TransportType::TeleportationItem,
        TransportType::TeleportationSpell,
        TransportType::WildernessObelisk,
        TransportType::MagicCarpet,
    ];

    /// File stem of the category's row file, also its config/env name.
    pub fn file_stem(self) -> &'static str {
        match self {
            TransportType::Transport => "transports",
            TransportType::AgilityShortcut => "agility_shortcuts",
            TransportType::GrappleShortcut => "grapple_shortcuts",
            TransportType::Boat => "boats",
            TransportType::Canoe => "canoes",
            TransportType::CharterShip => "charter_ships",
            TransportType::Ship => "ships",
            TransportType::FairyRing => "fairy_rings",
            TransportType::GnomeGlider => "gnome_gliders",
            TransportType::HotAirBalloon => "hot_air_balloons",
            TransportType::Minecart => "minecarts",
            TransportType::Quetzal => "quetzals",
            TransportType::SpiritTree => "spirit_trees",
            TransportType::TeleportationLever => "teleportation_levers",
            TransportType::TeleportationMinigame => "teleportation_minigames",
            TransportType::TeleportationPortal => "teleportation_portals",
            TransportType::TeleportationItem => "teleportation_items",
            TransportType::TeleportationSpell => "teleportation_spells",
            TransportType::WildernessObelisk => "wilderness_obelisks",
            TransportType::MagicCarpet => "magic_carpets",
        }
    }

    pub fn from_file_stem(stem: &str) -> Option<TransportType> {
        TransportType::ALL.iter().copied().find(|t| t.file_stem() == stem)
    }

    /// Hub networks list boarding and disembarking points separately and
    /// are expanded pairwise by the loader.
    pub fn is_hub_network(self) -> bool {
        matches!(
            self,
            TransportType::FairyRing
                | TransportType::GnomeGlider
                | TransportType::SpiritTree
                | TransportType::Quetzal
                | TransportType::WildernessObelisk
        )
    }

    /// Player-anchored categories are usable from any tile: rows carry no
    /// origin and land in the teleport pool instead of the origin map.
    pub fn is_player_anchored(self) -> bool {
        matches!(
            self,
            TransportType::TeleportationItem
                | TransportType::TeleportationSpell
                | TransportType::TeleportationMinigame
        )
    }

    /// Minimum 2D distance between two hub stops before a pairwise edge is
    /// synthesized; anything closer is walkable and would only shadow the
    /// true walking edge with a duplicate.
    pub fn hub_min_distance(self) -> i32 {
        match self {
            TransportType::FairyRing | TransportType::WildernessObelisk => 16,
            TransportType::GnomeGlider | TransportType::Quetzal => 32,
            _ => 20,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VarComparator {
    Equal,
    Greater,
    Less,
    BitSet,
    CooldownMinutes,
}

/// One check against a live game variable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VarCheck {
    pub id: i32,
    pub comparator: VarComparator,
    pub value: i32,
}

impl VarCheck {
    pub fn passes(&self, current: i32, now_tick: i32) -> bool {
        match self.comparator {
            VarComparator::Equal => current == self.value,
            VarComparator::Greater => current > self.value,
            VarComparator::Less => current < self.value,
            VarComparator::BitSet => current & self.value != 0,
            // variable holds the tick the cooldown started
            VarComparator::CooldownMinutes => {
                now_tick - current >= self.value * TICKS_PER_MINUTE
            }
        }
    }
}

/// One required stack: any of the alternative ids, at the given quantity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemSlot {
    pub alternatives: Vec<i32>,
    pub quantity: i32,
}

impl ItemSlot {
    fn satisfied(&self, counts: &HashMap<i32, i32>) -> bool {
        self.alternatives
            .iter()
            .any(|id| counts.get(id).copied().unwrap_or(0) >= self.quantity)
    }
}

/// Conjunction of slots; the whole group must be carried together.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ItemGroup {
    pub slots: Vec<ItemSlot>,
}

impl ItemGroup {
    fn satisfied(&self, counts: &HashMap<i32, i32>) -> bool {
        self.slots.iter().all(|s| s.satisfied(counts))
    }
}

/// A directed edge between two world points, gated by account state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transport {
    /// [`UNDEFINED`] means player-anchored: usable from wherever the
    /// search currently stands.
    pub origin: PackedPoint,
    pub destination: PackedPoint,
    pub transport_type: TransportType,
    pub skill_levels: [i32; SKILL_SLOTS],
    pub quests: BTreeSet<String>,
    /// Disjunction of groups; empty means no item requirement.
    pub item_groups: Vec<ItemGroup>,
    pub varbits: Vec<VarCheck>,
    pub varplayers: Vec<VarCheck>,
    /// Traversal time in ticks, always >= 1.
    pub duration: i32,
    pub consumable: bool,
    pub max_wilderness_level: i32,
    pub info: String,
}

impl Transport {
    pub fn is_player_anchored(&self) -> bool {
        self.origin == UNDEFINED
    }

    pub fn items_satisfied(&self, counts: &HashMap<i32, i32>) -> bool {
        self.item_groups.is_empty() || self.item_groups.iter().any(|g| g.satisfied(counts))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadStats {
    pub files: usize,
    pub rows: usize,
    pub skipped_rows: usize,
    pub transports: usize,
}

/// Every transport in the world, indexed by origin, with the
/// player-anchored bucket kept separately. Immutable once loaded.
#[derive(Default)]
pub struct TransportUniverse {
    by_origin: HashMap<PackedPoint, Vec<Arc<Transport>>>,
    teleports: Vec<Arc<Transport>>,
    quests: BTreeSet<String>,
    varbit_ids: BTreeSet<i32>,
    varplayer_ids: BTreeSet<i32>,
    count: usize,
}

impl TransportUniverse {
    /// Inserts one transport, dropping degenerate edges: an undefined or
    /// placeholder destination, a placeholder origin, or origin ==
    /// destination.
    pub fn add(&mut self, transport: Transport) {
        if transport.destination == UNDEFINED
            || transport.destination == HUB_PLACEHOLDER
            || transport.origin == HUB_PLACEHOLDER
            || transport.origin == transport.destination
        {
            return;
        }
        self.quests.extend(transport.quests.iter().cloned());
        self.varbit_ids.extend(transport.varbits.iter().map(|v| v.id));
        self.varplayer_ids.extend(transport.varplayers.iter().map(|v| v.id));
        self.count += 1;
        let transport = Arc::new(transport);
        if transport.is_player_anchored() {
            self.teleports.push(transport);
        } else {
            self.by_origin.entry(transport.origin).or_default().push(transport);
        }
    }

    pub fn at(&self, origin: PackedPoint) -> &[Arc<Transport>] {
        self.by_origin.get(&origin).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_origin(&self) -> &HashMap<PackedPoint, Vec<Arc<Transport>>> {
        &self.by_origin
    }

    pub fn teleports(&self) -> &[Arc<Transport>] {
        &self.teleports
    }

    pub fn referenced_quests(&self) -> &BTreeSet<String> {
        &self.quests
    }

    pub fn referenced_varbits(&self) -> &BTreeSet<i32> {
        &self.varbit_ids
    }

    pub fn referenced_varplayers(&self) -> &BTreeSet<i32> {
        &self.varplayer_ids
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Transport>> {
        self.by_origin.values().flatten().chain(self.teleports.iter())
    }

    /// Census per category, for diagnostics.
    pub fn kind_counts(&self) -> BTreeMap<TransportType, usize> {
        let mut counts = BTreeMap::new();
        for t in self.iter() {
            *counts.entry(t.transport_type).or_insert(0) += 1;
        }
        counts
    }

    /// Parses one category's rows into the universe. Hub networks are
    /// partitioned into explicit edges and boarding/disembarking legs,
    /// then the legs are permuted (see [`permutation`]). Malformed rows
    /// are logged and dropped, never fatal.
    pub fn load_rows(&mut self, rows: Vec<TransportRow>, kind: TransportType, stats: &mut LoadStats) {
        let mut origin_legs: Vec<Transport> = Vec::new();
        let mut destination_legs: Vec<Transport> = Vec::new();

        for (i, row) in rows.into_iter().enumerate() {
            stats.rows += 1;
            let parsed = match parse::parse_row(&row, kind) {
                Ok(t) => t,
                Err(e) => {
                    warn!("{}: dropping row {}: {}", kind.file_stem(), i, e);
                    stats.skipped_rows += 1;
                    continue;
                }
            };
            if kind.is_hub_network() {
                match (parsed.origin != HUB_PLACEHOLDER, parsed.destination != HUB_PLACEHOLDER) {
                    (true, true) => self.add(parsed),
                    (true, false) => origin_legs.push(parsed),
                    (false, true) => destination_legs.push(parsed),
                    (false, false) => {
                        warn!("{}: dropping row {}: neither endpoint given", kind.file_stem(), i);
                        stats.skipped_rows += 1;
                    }
                }
            } else {
                self.add(parsed);
            }
        }

        if kind.is_hub_network() {
            for merged in permutation::expand(&origin_legs, &destination_legs, kind) {
                self.add(merged);
            }
        }
    }

    /// Loads every `<category>.json` row file in `dir`. Files whose stem
    /// is no known category, or which fail to parse as a row array, are
    /// logged and skipped.
    pub fn load_dir(dir: &Path) -> Result<(Self, LoadStats)> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("read transports dir {}", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut universe = TransportUniverse::default();
        let mut stats = LoadStats::default();
        for path in paths {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            let Some(kind) = TransportType::from_file_stem(stem) else {
                warn!("skipping transport file {}: unknown category", path.display());
                continue;
            };
            let file = File::open(&path)
                .with_context(|| format!("open transport file {}", path.display()))?;
            let rows: Vec<TransportRow> = match serde_json::from_reader(BufReader::new(file)) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("skipping transport file {}: {}", path.display(), e);
                    continue;
                }
            };
            stats.files += 1;
            universe.load_rows(rows, kind, &mut stats);
        }
        stats.transports = universe.len();
        info!(
            "loaded {} transports from {} files ({} rows, {} dropped)",
            stats.transports, stats.files, stats.rows, stats.skipped_rows
        );
        Ok((universe, stats))
    }
}
