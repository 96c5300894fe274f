//! Row grammar for transport data files.
//!
//! Every requirement field is a `;`-separated list. Skills are
//! `<level> <SKILL>`, items are `|`-separated groups of `&`-joined
//! `<qty> <id>[/<id>...]` slots, variable checks are `<id><op><value>`
//! with op one of `=`, `>`, `<`, `&`, `@` (cooldown minutes).

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{
    ItemGroup, ItemSlot, Skill, Transport, TransportType, VarCheck, VarComparator, HUB_PLACEHOLDER,
    SKILL_SLOTS,
};
use crate::coord::{pack, PackedPoint, UNDEFINED};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransportRow {
    #[serde(default)]
    pub origin: Option<[i32; 3]>,
    #[serde(default)]
    pub destination: Option<[i32; 3]>,
    #[serde(default)]
    pub skills: String,
    #[serde(default)]
    pub items: String,
    #[serde(default)]
    pub quests: String,
    #[serde(default)]
    pub varbits: String,
    #[serde(default)]
    pub varplayers: String,
    #[serde(default)]
    pub duration: i32,
    #[serde(default)]
    pub consumable: bool,
    #[serde(default)]
    pub max_wilderness_level: i32,
    #[serde(default)]
    pub info: String,
}

fn parts(field: &str) -> impl Iterator<Item = &str> {
    field.split(';').map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_skills(field: &str) -> Result<[i32; SKILL_SLOTS]> {
    let mut levels = [0; SKILL_SLOTS];
    for part in parts(field) {
        let (level, name) = part
            .split_once(' ')
            .ok_or_else(|| anyhow!("skill requirement `{}` is not `<level> <skill>`", part))?;
        let level: i32 = level.trim().parse().with_context(|| format!("skill level in `{}`", part))?;
        let skill = Skill::from_name(name)
            .ok_or_else(|| anyhow!("unknown skill `{}`", name.trim()))?;
        let slot = &mut levels[skill.index()];
        *slot = (*slot).max(level);
    }
    Ok(levels)
}

pub fn parse_items(field: &str) -> Result<Vec<ItemGroup>> {
    let mut groups = Vec::new();
    for group in field.split('|').map(str::trim).filter(|s| !s.is_empty()) {
        let mut slots = Vec::new();
        for slot in group.split('&').map(str::trim).filter(|s| !s.is_empty()) {
            let (qty, ids) = slot
                .split_once(' ')
                .ok_or_else(|| anyhow!("item slot `{}` is not `<qty> <id>`", slot))?;
            let quantity: i32 = qty.trim().parse().with_context(|| format!("quantity in `{}`", slot))?;
            let alternatives = ids
                .split('/')
                .map(|id| id.trim().parse::<i32>().with_context(|| format!("item id in `{}`", slot)))
                .collect::<Result<Vec<_>>>()?;
            if alternatives.is_empty() {
                bail!("item slot `{}` lists no ids", slot);
            }
            slots.push(ItemSlot { alternatives, quantity });
        }
        if !slots.is_empty() {
            groups.push(ItemGroup { slots });
        }
    }
    Ok(groups)
}

pub fn parse_quests(field: &str) -> BTreeSet<String> {
    parts(field).map(str::to_string).collect()
}

pub fn parse_vars(field: &str) -> Result<Vec<VarCheck>> {
    let mut checks = Vec::new();
    for part in parts(field) {
        let op_at = part
            .find(|c| matches!(c, '=' | '>' | '<' | '&' | '@'))
            .ok_or_else(|| anyhow!("variable check `{}` has no comparator", part))?;
        let comparator = match part.as_bytes()[op_at] {
            b'=' => VarComparator::Equal,
            b'>' => VarComparator::Greater,
            b'<' => VarComparator::Less,
            b'&' => VarComparator::BitSet,
            _ => VarComparator::CooldownMinutes,
        };
        let id: i32 = part[..op_at].trim().parse().with_context(|| format!("variable id in `{}`", part))?;
        let value: i32 = part[op_at + 1..]
            .trim()
            .parse()
            .with_context(|| format!("variable value in `{}`", part))?;
        checks.push(VarCheck { id, comparator, value });
    }
    Ok(checks)
}

fn pack_endpoint(triple: &[i32; 3]) -> Result<PackedPoint> {
    let p = pack(triple[0], triple[1], triple[2]);
    if p == UNDEFINED {
        bail!("coordinate ({},{},{}) out of range", triple[0], triple[1], triple[2]);
    }
    Ok(p)
}

/// Parses one row into a transport. Hub rows may leave either endpoint as
/// the placeholder; player-anchored rows leave the origin undefined;
/// everything else needs both endpoints.
pub fn parse_row(row: &TransportRow, kind: TransportType) -> Result<Transport> {
    let origin = row.origin.as_ref().map(pack_endpoint).transpose()?;
    let destination = row.destination.as_ref().map(pack_endpoint).transpose()?;

    let (origin, destination) = if kind.is_hub_network() {
        (origin.unwrap_or(HUB_PLACEHOLDER), destination.unwrap_or(HUB_PLACEHOLDER))
    } else if kind.is_player_anchored() {
        let dest = destination.ok_or_else(|| anyhow!("missing destination"))?;
        (origin.unwrap_or(UNDEFINED), dest)
    } else {
        let orig = origin.ok_or_else(|| anyhow!("missing origin"))?;
        let dest = destination.ok_or_else(|| anyhow!("missing destination"))?;
        (orig, dest)
    };

    Ok(Transport {
        origin,
        destination,
        transport_type: kind,
        skill_levels: parse_skills(&row.skills)?,
        quests: parse_quests(&row.quests),
        item_groups: parse_items(&row.items)?,
        varbits: parse_vars(&row.varbits)?,
        varplayers: parse_vars(&row.varplayers)?,
        duration: row.duration.max(1),
        consumable: row.consumable,
        max_wilderness_level: row.max_wilderness_level,
        info: row.info.clone(),
    })
}
