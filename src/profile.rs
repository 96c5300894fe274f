//! Account state loaded from a JSON file, for the CLI and for tests. The
//! host environment normally supplies its own live [`StateProvider`];
//! this one is a frozen snapshot that always owns its state.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::eligibility::{QuestState, StateProvider, VarDomain};
use crate::transports::Skill;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerProfile {
    #[serde(default = "default_true")]
    pub logged_in: bool,
    #[serde(default)]
    pub tick: i32,
    /// Boosted levels by skill name; unlisted skills are level 1,
    /// unlisted pseudo-skills 0.
    #[serde(default)]
    pub skills: BTreeMap<String, i32>,
    #[serde(default)]
    pub quests_finished: BTreeSet<String>,
    #[serde(default)]
    pub quests_in_progress: BTreeSet<String>,
    #[serde(default)]
    pub varbits: BTreeMap<i32, i32>,
    #[serde(default)]
    pub varplayers: BTreeMap<i32, i32>,
    /// Carried item counts across inventory and equipment.
    #[serde(default)]
    pub items: BTreeMap<i32, i32>,
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self {
            logged_in: true,
            tick: 0,
            skills: BTreeMap::new(),
            quests_finished: BTreeSet::new(),
            quests_in_progress: BTreeSet::new(),
            varbits: BTreeMap::new(),
            varplayers: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }
}

impl PlayerProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open profile {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse profile {}", path.display()))
    }
}

impl StateProvider for PlayerProfile {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn boosted_skill_level(&self, skill: Skill) -> i32 {
        if let Some(&level) = self.skills.get(skill.name()) {
            return level;
        }
        match skill {
            Skill::TotalLevel | Skill::CombatLevel | Skill::QuestPoints => 0,
            _ => 1,
        }
    }

    fn quest_state(&self, quest: &str) -> QuestState {
        if self.quests_finished.contains(quest) {
            QuestState::Finished
        } else if self.quests_in_progress.contains(quest) {
            QuestState::InProgress
        } else {
            QuestState::NotStarted
        }
    }

    fn var_value(&self, domain: VarDomain, id: i32) -> i32 {
        let map = match domain {
            VarDomain::Varbit => &self.varbits,
            VarDomain::Varplayer => &self.varplayers,
        };
        map.get(&id).copied().unwrap_or(0)
    }

    fn carried_item_counts(&self) -> HashMap<i32, i32> {
        self.items.iter().map(|(&id, &n)| (id, n)).collect()
    }

    fn current_tick(&self) -> i32 {
        self.tick
    }

    fn current_thread_is_state_owner(&self) -> bool {
        true
    }
}
