//! Time-bounded, cancellable uniform-cost search over walking edges and
//! transports.
//!
//! One [`Pathfinder`] serves one request: Idle -> Running -> one of
//! Succeeded / Failed / Cancelled, no re-entry. Workers share nothing
//! mutable: the collision map and eligibility snapshot are immutable and
//! captured at construction, so a concurrent refresh never disturbs a
//! search in flight.

use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::collision::{CollisionMap, Dir};
use crate::config::SearchConfig;
use crate::coord::{distance_2d, pack, unpack, PackedPoint};
use crate::eligibility::Snapshot;
use crate::transports::Transport;
use crate::wilderness::{is_in_wilderness, wilderness_level};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PathStatus {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// First-class search outcomes; callers branch on all four. Timed-out and
/// cancelled searches still carry the best partial path found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathResult {
    Path(Vec<PackedPoint>),
    NoPath,
    TimedOut(Vec<PackedPoint>),
    Cancelled(Vec<PackedPoint>),
}

/// Arena node; the predecessor chain is stored as indices into the node
/// vector, rooted at the start.
#[derive(Copy, Clone)]
struct Node {
    pos: PackedPoint,
    parent: i32,
    cost: i32,
}

pub struct Pathfinder {
    collision: Arc<CollisionMap>,
    snapshot: Arc<Snapshot>,
    avoid_wilderness: bool,
    cutoff: Duration,
    start: PackedPoint,
    targets: HashSet<PackedPoint>,
    target_in_wilderness: bool,
    cancel: Arc<AtomicBool>,
    status: PathStatus,
    result: Option<PathResult>,
}

impl Pathfinder {
    pub fn new(
        collision: Arc<CollisionMap>,
        snapshot: Arc<Snapshot>,
        config: &SearchConfig,
        start: PackedPoint,
        targets: &[PackedPoint],
    ) -> Self {
        let targets: HashSet<PackedPoint> =
            targets.iter().copied().filter(|&t| t != crate::coord::UNDEFINED).collect();
        let target_in_wilderness = targets.iter().any(|&t| is_in_wilderness(t));
        Self {
            collision,
            snapshot,
            avoid_wilderness: config.avoid_wilderness,
            cutoff: Duration::from_millis(config.cutoff_millis),
            start,
            targets,
            target_in_wilderness,
            cancel: Arc::new(AtomicBool::new(false)),
            status: PathStatus::Idle,
            result: None,
        }
    }

    /// Handle for cooperative cancellation; checked once per queue pop.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn status(&self) -> PathStatus {
        self.status
    }

    /// Runs the search to a terminal state. A finished instance returns
    /// its recorded result instead of searching again.
    pub fn run(&mut self) -> PathResult {
        if self.status != PathStatus::Idle {
            return self.result.clone().unwrap_or(PathResult::NoPath);
        }
        self.status = PathStatus::Running;
        let result = self.search();
        self.status = match &result {
            PathResult::Path(_) => PathStatus::Succeeded,
            PathResult::NoPath | PathResult::TimedOut(_) => PathStatus::Failed,
            PathResult::Cancelled(_) => PathStatus::Cancelled,
        };
        self.result = Some(result.clone());
        result
    }

    fn search(&self) -> PathResult {
        if self.targets.is_empty() || self.start == crate::coord::UNDEFINED {
            return PathResult::NoPath;
        }
        let started = Instant::now();

        let mut nodes: Vec<Node> = vec![Node { pos: self.start, parent: -1, cost: 0 }];
        // frontier ordered by (cost, packed coordinate, insertion order)
        // so equal-cost ties resolve the same way on every run
        let mut frontier: BTreeSet<(i32, PackedPoint, u32)> = BTreeSet::new();
        frontier.insert((0, self.start, 0));
        let mut best: HashMap<PackedPoint, i32> = HashMap::new();
        best.insert(self.start, 0);

        // anchored teleports depend on the frontier's danger level, so the
        // filtered pool is materialized once per level encountered
        let mut pools: HashMap<i32, Vec<Arc<Transport>>> = HashMap::new();

        let mut nearest = (self.distance_to_targets(self.start), 0u32);

        while let Some(&entry) = frontier.iter().next() {
            frontier.remove(&entry);
            let (cost, pos, idx) = entry;

            if self.cancel.load(Ordering::Relaxed) {
                debug!("search cancelled after {} nodes", nodes.len());
                return PathResult::Cancelled(reconstruct(&nodes, nearest.1));
            }
            if started.elapsed() >= self.cutoff {
                debug!("search timed out after {} nodes", nodes.len());
                return PathResult::TimedOut(reconstruct(&nodes, nearest.1));
            }
            // superseded queue entry
            if best.get(&pos).copied().unwrap_or(i32::MAX) < cost {
                continue;
            }
            if self.targets.contains(&pos) {
                debug!("search reached a target at cost {} ({} nodes, {:?})", cost, nodes.len(), started.elapsed());
                return PathResult::Path(reconstruct(&nodes, idx));
            }

            let dist = self.distance_to_targets(pos);
            if dist < nearest.0 {
                nearest = (dist, idx);
            }

            self.expand_walking(pos, idx, cost, &mut nodes, &mut frontier, &mut best);

            for t in self.snapshot.at(pos) {
                self.relax(t.destination, idx, cost + t.duration, pos, &mut nodes, &mut frontier, &mut best);
            }
            let level = wilderness_level(pos);
            let pool = pools
                .entry(level)
                .or_insert_with(|| self.snapshot.teleports_for(level));
            for t in pool.iter() {
                self.relax(t.destination, idx, cost + t.duration, pos, &mut nodes, &mut frontier, &mut best);
            }
        }

        debug!("search exhausted {} nodes without reaching a target", nodes.len());
        PathResult::NoPath
    }

    fn distance_to_targets(&self, pos: PackedPoint) -> i32 {
        self.targets.iter().map(|&t| distance_2d(pos, t)).min().unwrap_or(i32::MAX)
    }

    /// Walking edges: up to eight neighbors at cost 1. A diagonal needs
    /// both L-shaped cardinal detours fully open, so a blocked corner is
    /// never cut.
    fn expand_walking(
        &self,
        pos: PackedPoint,
        idx: u32,
        cost: i32,
        nodes: &mut Vec<Node>,
        frontier: &mut BTreeSet<(i32, PackedPoint, u32)>,
        best: &mut HashMap<PackedPoint, i32>,
    ) {
        let (x, y, p) = unpack(pos);
        let map = &self.collision;
        let w = !map.is_blocked(x, y, p, Dir::West);
        let e = !map.is_blocked(x, y, p, Dir::East);
        let s = !map.is_blocked(x, y, p, Dir::South);
        let n = !map.is_blocked(x, y, p, Dir::North);

        let mut step = |dx: i32, dy: i32, ok: bool| {
            if ok {
                let next = pack(x + dx, y + dy, p);
                if next != crate::coord::UNDEFINED {
                    self.relax(next, idx, cost + 1, pos, nodes, frontier, best);
                }
            }
        };

        step(-1, 0, w);
        step(1, 0, e);
        step(0, -1, s);
        step(0, 1, n);
        step(
            -1,
            -1,
            w && s
                && !map.is_blocked(x - 1, y, p, Dir::South)
                && !map.is_blocked(x, y - 1, p, Dir::West),
        );
        step(
            1,
            -1,
            e && s
                && !map.is_blocked(x + 1, y, p, Dir::South)
                && !map.is_blocked(x, y - 1, p, Dir::East),
        );
        step(
            -1,
            1,
            w && n
                && !map.is_blocked(x - 1, y, p, Dir::North)
                && !map.is_blocked(x, y + 1, p, Dir::West),
        );
        step(
            1,
            1,
            e && n
                && !map.is_blocked(x + 1, y, p, Dir::North)
                && !map.is_blocked(x, y + 1, p, Dir::East),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn relax(
        &self,
        next: PackedPoint,
        parent: u32,
        next_cost: i32,
        from: PackedPoint,
        nodes: &mut Vec<Node>,
        frontier: &mut BTreeSet<(i32, PackedPoint, u32)>,
        best: &mut HashMap<PackedPoint, i32>,
    ) {
        // never step from outside the wilderness into it unless that is
        // where the caller wants to go
        if self.avoid_wilderness
            && !self.target_in_wilderness
            && !is_in_wilderness(from)
            && is_in_wilderness(next)
        {
            return;
        }
        if next_cost < best.get(&next).copied().unwrap_or(i32::MAX) {
            best.insert(next, next_cost);
            let idx = nodes.len() as u32;
            nodes.push(Node { pos: next, parent: parent as i32, cost: next_cost });
            frontier.insert((next_cost, next, idx));
        }
    }
}

fn reconstruct(nodes: &[Node], mut idx: u32) -> Vec<PackedPoint> {
    let mut path = Vec::new();
    loop {
        let node = nodes[idx as usize];
        path.push(node.pos);
        if node.parent < 0 {
            break;
        }
        idx = node.parent as u32;
    }
    path.reverse();
    path
}

/// One-shot convenience wrapper over [`Pathfinder`].
pub fn find_path(
    collision: &Arc<CollisionMap>,
    snapshot: Arc<Snapshot>,
    config: &SearchConfig,
    start: PackedPoint,
    targets: &[PackedPoint],
) -> PathResult {
    Pathfinder::new(Arc::clone(collision), snapshot, config, start, targets).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{region_id, RegionFlags};
    use crate::coord::UNDEFINED;
    use crate::eligibility::Eligibility;
    use crate::profile::PlayerProfile;
    use crate::transports::{Transport, TransportType, TransportUniverse, SKILL_SLOTS};
    use std::collections::BTreeSet as Quests;
    use std::collections::HashMap as Regions;

    fn open_map(region_ids: &[i32]) -> Arc<CollisionMap> {
        let regions: Regions<i32, RegionFlags> =
            region_ids.iter().map(|&id| (id, RegionFlags::new())).collect();
        Arc::new(CollisionMap::from_regions(regions))
    }

    fn transport(origin: PackedPoint, destination: PackedPoint, duration: i32) -> Transport {
        Transport {
            origin,
            destination,
            transport_type: TransportType::Transport,
            skill_levels: [0; SKILL_SLOTS],
            quests: Quests::new(),
            item_groups: Vec::new(),
            varbits: Vec::new(),
            varplayers: Vec::new(),
            duration,
            consumable: false,
            max_wilderness_level: 0,
            info: String::new(),
        }
    }

    fn snapshot_of(transports: Vec<Transport>) -> Arc<crate::eligibility::Snapshot> {
        let mut universe = TransportUniverse::default();
        for t in transports {
            universe.add(t);
        }
        let mut el = Eligibility::new(Arc::new(universe), SearchConfig::default());
        el.refresh(&PlayerProfile::default());
        el.snapshot()
    }

    fn run(
        map: &Arc<CollisionMap>,
        transports: Vec<Transport>,
        start: PackedPoint,
        targets: &[PackedPoint],
    ) -> PathResult {
        find_path(map, snapshot_of(transports), &SearchConfig::default(), start, targets)
    }

    #[test]
    fn walks_a_straight_line() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(5, 5, 0);
        let goal = pack(8, 5, 0);
        match run(&map, vec![], start, &[goal]) {
            PathResult::Path(path) => {
                assert_eq!(path.len(), 4);
                assert_eq!(path[0], start);
                assert_eq!(path[3], goal);
            }
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn walks_diagonals_when_open() {
        let map = open_map(&[region_id(5, 5)]);
        match run(&map, vec![], pack(5, 5, 0), &[pack(8, 8, 0)]) {
            PathResult::Path(path) => assert_eq!(path.len(), 4),
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn blocked_corner_is_not_cut() {
        let mut flags = RegionFlags::new();
        flags.set(6, 5, 0, 0, false); // north edge of (6,5): breaks the E-then-N detour
        let map = Arc::new(CollisionMap::from_regions(Regions::from([(0, flags)])));
        match run(&map, vec![], pack(5, 5, 0), &[pack(6, 6, 0)]) {
            PathResult::Path(path) => {
                // the direct diagonal would be 2 nodes; the detour is 3
                assert_eq!(path.len(), 3);
                assert_eq!(path[1], pack(5, 6, 0));
            }
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn takes_a_transport_over_a_long_walk() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(5, 5, 0);
        let goal = pack(50, 50, 0);
        let t = transport(start, goal, 2);
        match run(&map, vec![t], start, &[goal]) {
            PathResult::Path(path) => assert_eq!(path, vec![start, goal]),
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn walks_when_the_transport_is_slower() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(5, 5, 0);
        let goal = pack(5, 8, 0);
        let t = transport(start, goal, 10);
        match run(&map, vec![t], start, &[goal]) {
            PathResult::Path(path) => assert_eq!(path.len(), 4),
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn anchored_teleports_expand_from_any_node() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(5, 5, 0);
        let goal = pack(60, 60, 0);
        let teleport = transport(UNDEFINED, goal, 3);
        match run(&map, vec![teleport], start, &[goal]) {
            PathResult::Path(path) => assert_eq!(path, vec![start, goal]),
            other => panic!("expected a path, got {:?}", other),
        }
    }

    #[test]
    fn unreachable_target_is_no_path() {
        let map = open_map(&[region_id(5, 5)]);
        let result = run(&map, vec![], pack(5, 5, 0), &[pack(200, 200, 0)]);
        assert_eq!(result, PathResult::NoPath);
    }

    #[test]
    fn empty_targets_is_no_path() {
        let map = open_map(&[region_id(5, 5)]);
        assert_eq!(run(&map, vec![], pack(5, 5, 0), &[]), PathResult::NoPath);
        assert_eq!(run(&map, vec![], pack(5, 5, 0), &[UNDEFINED]), PathResult::NoPath);
    }

    #[test]
    fn zero_cutoff_times_out_with_a_partial_path() {
        let map = open_map(&[region_id(5, 5)]);
        let mut config = SearchConfig::default();
        config.cutoff_millis = 0;
        let result = find_path(&map, snapshot_of(vec![]), &config, pack(5, 5, 0), &[pack(40, 40, 0)]);
        match result {
            PathResult::TimedOut(partial) => assert_eq!(partial, vec![pack(5, 5, 0)]),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn cancellation_short_circuits_at_the_next_pop() {
        let map = open_map(&[region_id(5, 5)]);
        let mut pf = Pathfinder::new(
            Arc::clone(&map),
            snapshot_of(vec![]),
            &SearchConfig::default(),
            pack(5, 5, 0),
            &[pack(40, 40, 0)],
        );
        pf.cancel_handle().store(true, Ordering::Relaxed);
        match pf.run() {
            PathResult::Cancelled(partial) => assert_eq!(partial, vec![pack(5, 5, 0)]),
            other => panic!("expected cancellation, got {:?}", other),
        }
        assert_eq!(pf.status(), PathStatus::Cancelled);
    }

    #[test]
    fn finished_instances_do_not_rerun() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(5, 5, 0);
        let mut pf = Pathfinder::new(
            Arc::clone(&map),
            snapshot_of(vec![]),
            &SearchConfig::default(),
            start,
            &[start],
        );
        assert_eq!(pf.status(), PathStatus::Idle);
        let first = pf.run();
        assert_eq!(first, PathResult::Path(vec![start]));
        assert_eq!(pf.status(), PathStatus::Succeeded);
        assert_eq!(pf.run(), first);
    }

    #[test]
    fn results_are_deterministic() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(3, 3, 0);
        let goal = pack(20, 17, 0);
        let a = run(&map, vec![], start, &[goal]);
        let b = run(&map, vec![], start, &[goal]);
        assert_eq!(a, b);
    }

    #[test]
    fn nearest_target_wins_among_many() {
        let map = open_map(&[region_id(5, 5)]);
        let start = pack(10, 10, 0);
        let near = pack(12, 10, 0);
        let far = pack(40, 40, 0);
        match run(&map, vec![], start, &[far, near]) {
            PathResult::Path(path) => assert_eq!(*path.last().unwrap(), near),
            other => panic!("expected a path, got {:?}", other),
        }
    }
}
