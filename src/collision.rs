//! Per-region edge-blocking flags.
//!
//! A region is 64x64 tiles across 4 planes with two edge flags per tile:
//! flag 0 owns the edge to the tile's north, flag 1 the edge to its east.
//! A tile's south edge is its southern neighbor's north flag and its west
//! edge its western neighbor's east flag, so every edge has exactly one
//! stored bit. Bit value 1 means the edge is open (the default).

use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const REGION_SIZE: i32 = 64;
pub const PLANES: i32 = 4;
const FLAGS_PER_TILE: usize = 2;
pub const REGION_BYTES: usize =
    (REGION_SIZE as usize * REGION_SIZE as usize * PLANES as usize * FLAGS_PER_TILE) / 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dir {
    North,
    South,
    East,
    West,
}

/// Region id in the world's usual convention.
pub fn region_id(x: i32, y: i32) -> i32 {
    ((x >> 6) << 8) | (y >> 6)
}

/// Dense edge-flag bitmap for one region. Bits are packed LSB-first with
/// linear index `(plane*64*64 + local_y*64 + local_x)*2 + flag`.
#[derive(Clone)]
pub struct RegionFlags {
    bits: Vec<u8>,
}

impl RegionFlags {
    /// All edges open.
    pub fn new() -> Self {
        Self { bits: vec![0xFF; REGION_BYTES] }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != REGION_BYTES {
            anyhow::bail!("expected {} bytes, got {}", REGION_BYTES, bytes.len());
        }
        Ok(Self { bits: bytes.to_vec() })
    }

    pub fn to_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn bit_index(local_x: i32, local_y: i32, plane: i32, flag: usize) -> usize {
        let tile = plane as usize * (REGION_SIZE * REGION_SIZE) as usize
            + local_y as usize * REGION_SIZE as usize
            + local_x as usize;
        tile * FLAGS_PER_TILE + flag
    }

    /// Set one edge flag; `flag` 0 = north edge, 1 = east edge.
    pub fn set(&mut self, local_x: i32, local_y: i32, plane: i32, flag: usize, open: bool) {
        let idx = Self::bit_index(local_x, local_y, plane, flag);
        let mask = 1u8 << (idx & 7);
        if open {
            self.bits[idx >> 3] |= mask;
        } else {
            self.bits[idx >> 3] &= !mask;
        }
    }

    fn get(&self, local_x: i32, local_y: i32, plane: i32, flag: usize) -> bool {
        let idx = Self::bit_index(local_x, local_y, plane, flag);
        (self.bits[idx >> 3] >> (idx & 7)) & 1 == 1
    }
}

impl Default for RegionFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable world collision map. Queries outside the loaded bounds are
/// blocked; a region inside the bounds with no data is fully open, which
/// is what an omitted all-default region file means.
pub struct CollisionMap {
    regions: HashMap<i32, RegionFlags>,
    // (rx_min, rx_max, ry_min, ry_max) of loaded regions
    bounds: Option<(i32, i32, i32, i32)>,
}

impl CollisionMap {
    pub fn from_regions(regions: HashMap<i32, RegionFlags>) -> Self {
        let bounds = regions.keys().fold(None::<(i32, i32, i32, i32)>, |acc, &id| {
            let (rx, ry) = (id >> 8, id & 0xFF);
            Some(match acc {
                None => (rx, rx, ry, ry),
                Some((x0, x1, y0, y1)) => (x0.min(rx), x1.max(rx), y0.min(ry), y1.max(ry)),
            })
        });
        Self { regions, bounds }
    }

    /// Loads every `<region_id>.bin` in `dir`. Files with a non-numeric
    /// stem or the wrong length are logged and skipped; they never abort
    /// the load.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("read collision dir {}", dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|e| e == "bin").unwrap_or(false))
            .collect();
        paths.sort();

        let parsed: Vec<(std::path::PathBuf, Result<(i32, RegionFlags)>)> = paths
            .into_par_iter()
            .map(|path| {
                let res = parse_region_file(&path);
                (path, res)
            })
            .collect();

        let mut regions = HashMap::new();
        for (path, res) in parsed {
            match res {
                Ok((id, flags)) => {
                    regions.insert(id, flags);
                }
                Err(e) => warn!("skipping collision file {}: {}", path.display(), e),
            }
        }
        info!("loaded {} collision regions from {}", regions.len(), dir.display());
        Ok(Self::from_regions(regions))
    }

    /// True when the flag bit is open. False outside loaded bounds or off
    /// the plane range, so unknown space is never walkable.
    fn open(&self, x: i32, y: i32, plane: i32, flag: usize) -> bool {
        if x < 0 || y < 0 || !(0..PLANES).contains(&plane) {
            return false;
        }
        let (rx, ry) = (x >> 6, y >> 6);
        match self.bounds {
            Some((x0, x1, y0, y1)) if rx >= x0 && rx <= x1 && ry >= y0 && ry <= y1 => {
                match self.regions.get(&region_id(x, y)) {
                    Some(region) => region.get(x & 0x3F, y & 0x3F, plane, flag),
                    None => true,
                }
            }
            _ => false,
        }
    }

    /// Is the edge leaving (x, y, plane) toward `dir` blocked? South and
    /// west resolve to the owning neighbor's stored flag, so both sides
    /// of an edge always agree.
    pub fn is_blocked(&self, x: i32, y: i32, plane: i32, dir: Dir) -> bool {
        let open = match dir {
            Dir::North => self.open(x, y, plane, 0),
            Dir::East => self.open(x, y, plane, 1),
            Dir::South => self.open(x, y - 1, plane, 0),
            Dir::West => self.open(x - 1, y, plane, 1),
        };
        !open
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

fn parse_region_file(path: &Path) -> Result<(i32, RegionFlags)> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("file stem is not utf-8")?;
    let id: i32 = stem.parse().with_context(|| format!("region id `{}`", stem))?;
    let bytes = fs::read(path)?;
    Ok((id, RegionFlags::from_bytes(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn map_with(region_ids: &[i32]) -> CollisionMap {
        let regions: HashMap<i32, RegionFlags> =
            region_ids.iter().map(|&id| (id, RegionFlags::new())).collect();
        CollisionMap::from_regions(regions)
    }

    #[test]
    fn open_world_is_walkable_in_all_directions() {
        let map = map_with(&[region_id(10, 10)]);
        for dir in [Dir::North, Dir::South, Dir::East, Dir::West] {
            assert!(!map.is_blocked(10, 10, 0, dir));
        }
    }

    #[test]
    fn south_and_west_resolve_to_the_owning_neighbor() {
        let mut flags = RegionFlags::new();
        flags.set(10, 10, 0, 0, false); // north edge of (10,10)
        flags.set(20, 20, 0, 1, false); // east edge of (20,20)
        let map = CollisionMap::from_regions(HashMap::from([(region_id(10, 10), flags)]));

        assert!(map.is_blocked(10, 10, 0, Dir::North));
        assert!(map.is_blocked(10, 11, 0, Dir::South));
        assert!(map.is_blocked(20, 20, 0, Dir::East));
        assert!(map.is_blocked(21, 20, 0, Dir::West));
        // unrelated edges stay open
        assert!(!map.is_blocked(10, 10, 0, Dir::East));
        assert!(!map.is_blocked(10, 10, 1, Dir::North));
    }

    #[test]
    fn edges_resolve_across_region_boundaries() {
        let mut west = RegionFlags::new();
        west.set(63, 5, 0, 1, false); // east edge of the region's last column
        let regions = HashMap::from([
            (region_id(63, 5), west),
            (region_id(64, 5), RegionFlags::new()),
        ]);
        let map = CollisionMap::from_regions(regions);
        assert!(map.is_blocked(63, 5, 0, Dir::East));
        assert!(map.is_blocked(64, 5, 0, Dir::West));
    }

    #[test]
    fn out_of_bounds_is_blocked_and_interior_gap_is_open() {
        let map = map_with(&[region_id(0, 0), region_id(128, 0)]);
        // region (1,0) has no data but lies inside the loaded rectangle
        assert!(!map.is_blocked(70, 5, 0, Dir::North));
        // north of the loaded rectangle
        assert!(map.is_blocked(10, 64, 0, Dir::North));
        // bad plane
        assert!(map.is_blocked(10, 10, 4, Dir::North));
        assert!(map.is_blocked(-1, 10, 0, Dir::East));
    }

    #[test]
    fn bit_layout_matches_the_file_format() {
        // (plane=0, local 3,2, flag=1) -> linear index (2*64+3)*2+1 = 263
        let mut bytes = vec![0xFFu8; REGION_BYTES];
        bytes[263 >> 3] &= !(1 << (263 & 7));
        let flags = RegionFlags::from_bytes(&bytes).unwrap();
        let map = CollisionMap::from_regions(HashMap::from([(0, flags)]));
        assert!(map.is_blocked(3, 2, 0, Dir::East));
        assert!(!map.is_blocked(3, 2, 0, Dir::North));
        assert!(!map.is_blocked(3, 3, 0, Dir::East));
    }

    #[test]
    fn set_then_serialize_round_trips() {
        let mut flags = RegionFlags::new();
        flags.set(0, 0, 3, 0, false);
        flags.set(63, 63, 0, 1, false);
        let restored = RegionFlags::from_bytes(flags.to_bytes()).unwrap();
        assert!(!restored.get(0, 0, 3, 0));
        assert!(!restored.get(63, 63, 0, 1));
        assert!(restored.get(0, 0, 0, 0));
    }

    #[test]
    fn load_dir_skips_malformed_files() {
        let dir = tempdir().unwrap();
        let good = RegionFlags::new();
        fs::write(dir.path().join("12850.bin"), good.to_bytes()).unwrap();
        fs::write(dir.path().join("notanumber.bin"), good.to_bytes()).unwrap();
        fs::write(dir.path().join("99.bin"), [0u8; 7]).unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let map = CollisionMap::load_dir(dir.path()).unwrap();
        assert_eq!(map.region_count(), 1);
    }
}
