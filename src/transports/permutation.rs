//! Pairwise expansion of hub networks.
//!
//! A hub category (fairy rings, gliders, spirit trees, ...) lists each
//! stop twice: a boarding leg carrying the requirements to depart and a
//! disembarking leg carrying the requirements to arrive. Any listed stop
//! reaches any other, so the concrete graph is the cross product of the
//! legs, minus pairs close enough to walk between.

use crate::coord::distance_2d;

use super::{Transport, TransportType};

/// Synthesizes one merged transport per (boarding, disembarking) pair
/// whose stops are further apart than the network's minimum distance.
pub fn expand(
    origin_legs: &[Transport],
    destination_legs: &[Transport],
    kind: TransportType,
) -> Vec<Transport> {
    let min_distance = kind.hub_min_distance();
    let mut out = Vec::new();
    for o in origin_legs {
        for d in destination_legs {
            let span = distance_2d(o.origin, d.destination);
            if span != i32::MAX && span <= min_distance {
                continue;
            }
            out.push(merge(o, d, kind));
        }
    }
    out
}

/// A rider must satisfy both ends, so requirements combine pointwise:
/// max skill per slot, union of quests and variable checks, concatenated
/// item groups, the longer duration, the stricter wilderness ceiling.
fn merge(o: &Transport, d: &Transport, kind: TransportType) -> Transport {
    let mut skill_levels = o.skill_levels;
    for (slot, &theirs) in skill_levels.iter_mut().zip(d.skill_levels.iter()) {
        *slot = (*slot).max(theirs);
    }

    let mut quests = o.quests.clone();
    quests.extend(d.quests.iter().cloned());

    let mut item_groups = o.item_groups.clone();
    item_groups.extend(d.item_groups.iter().cloned());

    let mut varbits = o.varbits.clone();
    for check in &d.varbits {
        if !varbits.contains(check) {
            varbits.push(*check);
        }
    }
    let mut varplayers = o.varplayers.clone();
    for check in &d.varplayers {
        if !varplayers.contains(check) {
            varplayers.push(*check);
        }
    }

    let info = match (o.info.is_empty(), d.info.is_empty()) {
        (false, false) => format!("{} to {}", o.info, d.info),
        (false, true) => o.info.clone(),
        _ => d.info.clone(),
    };

    Transport {
        origin: o.origin,
        destination: d.destination,
        transport_type: kind,
        skill_levels,
        quests,
        item_groups,
        varbits,
        varplayers,
        duration: o.duration.max(d.duration).max(1),
        consumable: o.consumable || d.consumable,
        max_wilderness_level: o.max_wilderness_level.min(d.max_wilderness_level),
        info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::pack;
    use crate::transports::{
        ItemGroup, ItemSlot, Skill, VarCheck, VarComparator, HUB_PLACEHOLDER, SKILL_SLOTS,
    };
    use std::collections::BTreeSet;

    fn leg(origin: i32, destination: i32) -> Transport {
        Transport {
            origin,
            destination,
            transport_type: TransportType::FairyRing,
            skill_levels: [0; SKILL_SLOTS],
            quests: BTreeSet::new(),
            item_groups: Vec::new(),
            varbits: Vec::new(),
            varplayers: Vec::new(),
            duration: 1,
            consumable: false,
            max_wilderness_level: 0,
            info: String::new(),
        }
    }

    #[test]
    fn merged_requirements_are_pointwise_max_and_union() {
        let mut o = leg(pack(100, 100, 0), HUB_PLACEHOLDER);
        o.skill_levels[Skill::Agility.index()] = 40;
        o.skill_levels[Skill::Magic.index()] = 10;
        o.quests.insert("Fairytale I".to_string());
        o.duration = 3;
        o.item_groups.push(ItemGroup {
            slots: vec![ItemSlot { alternatives: vec![772], quantity: 1 }],
        });
        o.varbits.push(VarCheck { id: 1, comparator: VarComparator::Equal, value: 1 });

        let mut d = leg(HUB_PLACEHOLDER, pack(500, 500, 0));
        d.skill_levels[Skill::Agility.index()] = 25;
        d.skill_levels[Skill::Magic.index()] = 60;
        d.quests.insert("Fairytale II".to_string());
        d.duration = 5;
        d.varbits.push(VarCheck { id: 1, comparator: VarComparator::Equal, value: 1 });
        d.varbits.push(VarCheck { id: 2, comparator: VarComparator::BitSet, value: 4 });

        let merged = expand(&[o], &[d], TransportType::FairyRing);
        assert_eq!(merged.len(), 1);
        let t = &merged[0];
        assert_eq!(t.skill_levels[Skill::Agility.index()], 40);
        assert_eq!(t.skill_levels[Skill::Magic.index()], 60);
        assert_eq!(
            t.quests,
            BTreeSet::from(["Fairytale I".to_string(), "Fairytale II".to_string()])
        );
        assert_eq!(t.item_groups.len(), 1);
        assert_eq!(t.varbits.len(), 2); // duplicate check collapses
        assert_eq!(t.duration, 5);
    }

    #[test]
    fn near_pairs_are_suppressed() {
        let far = pack(1000, 1000, 0);
        let origins = vec![leg(pack(100, 100, 0), HUB_PLACEHOLDER)];
        let destinations = vec![
            leg(HUB_PLACEHOLDER, pack(100, 110, 0)), // 10 tiles: too close
            leg(HUB_PLACEHOLDER, pack(100, 116, 0)), // exactly at the threshold
            leg(HUB_PLACEHOLDER, far),
        ];
        let merged = expand(&origins, &destinations, TransportType::FairyRing);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].destination, far);
        for t in &merged {
            assert!(distance_2d(t.origin, t.destination) > TransportType::FairyRing.hub_min_distance());
        }
    }

    #[test]
    fn cross_plane_pairs_are_kept() {
        // cross-plane stops are incomparable by walking, never "too close"
        let origins = vec![leg(pack(100, 100, 0), HUB_PLACEHOLDER)];
        let destinations = vec![leg(HUB_PLACEHOLDER, pack(100, 102, 1))];
        let merged = expand(&origins, &destinations, TransportType::FairyRing);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn stricter_wilderness_ceiling_wins() {
        let mut o = leg(pack(100, 100, 0), HUB_PLACEHOLDER);
        o.max_wilderness_level = 30;
        let mut d = leg(HUB_PLACEHOLDER, pack(500, 500, 0));
        d.max_wilderness_level = 20;
        let merged = expand(&[o], &[d], TransportType::WildernessObelisk);
        assert_eq!(merged[0].max_wilderness_level, 20);
    }
}
