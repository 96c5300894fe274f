use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use navroute::collision::CollisionMap;
use navroute::config::SearchConfig;
use navroute::coord::{pack, unpack, PackedPoint, UNDEFINED};
use navroute::eligibility::Eligibility;
use navroute::logging;
use navroute::profile::PlayerProfile;
use navroute::search::{find_path, PathResult};
use navroute::transports::{TransportType, TransportUniverse};

#[derive(Parser, Debug)]
#[command(name = "navroute", version, about = "Route planning over tile collision data and conditional transports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute a route and print it as JSON
    FindPath {
        /// Directory of per-region collision files (<region_id>.bin)
        #[arg(long)]
        collision_dir: PathBuf,
        /// Directory of per-category transport row files (<category>.json)
        #[arg(long)]
        transports_dir: PathBuf,
        /// Player state JSON (skills, quests, variables, items); defaults to a fresh account
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Start tile as x,y,plane
        #[arg(long)]
        start: String,
        /// Target tile as x,y,plane (repeatable)
        #[arg(long, num_args = 1..)]
        target: Vec<String>,
        /// Wall-clock budget in milliseconds
        #[arg(long)]
        cutoff_ms: Option<u64>,
        /// Permit routes that enter the wilderness
        #[arg(long)]
        allow_wilderness: bool,
        /// Transport categories to disable (by file stem, comma-separated)
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,
        /// Log level (trace|debug|info|warn|error)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Load transport data and print a per-category census
    TransportStats {
        /// Directory of per-category transport row files
        #[arg(long)]
        transports_dir: PathBuf,
        /// Log level (trace|debug|info|warn|error)
        #[arg(long)]
        log_level: Option<String>,
    },
}

fn parse_tile(s: &str) -> Option<PackedPoint> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return None;
    }
    let x = parts[0].trim().parse::<i32>().ok()?;
    let y = parts[1].trim().parse::<i32>().ok()?;
    let plane = parts[2].trim().parse::<i32>().ok()?;
    let p = pack(x, y, plane);
    if p == UNDEFINED {
        None
    } else {
        Some(p)
    }
}

fn tile_json(p: PackedPoint) -> serde_json::Value {
    let (x, y, plane) = unpack(p);
    serde_json::json!([x, y, plane])
}

fn path_json(path: &[PackedPoint]) -> serde_json::Value {
    serde_json::Value::Array(path.iter().map(|&p| tile_json(p)).collect())
}

fn cmd_find_path(
    collision_dir: &PathBuf,
    transports_dir: &PathBuf,
    profile_path: Option<&PathBuf>,
    start: &str,
    targets: &[String],
    mut config: SearchConfig,
) -> Result<()> {
    let start = parse_tile(start).with_context(|| format!("invalid start tile `{}`", start))?;
    let mut target_points = Vec::new();
    for t in targets {
        let p = parse_tile(t).with_context(|| format!("invalid target tile `{}`", t))?;
        target_points.push(p);
    }
    if target_points.is_empty() {
        bail!("at least one --target is required");
    }

    config.apply_env();
    logging::init(config.log_level.as_deref());
    if let Some(n) = config.threads {
        let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
    }

    let collision = Arc::new(CollisionMap::load_dir(collision_dir)?);
    let (universe, _) = TransportUniverse::load_dir(transports_dir)?;
    let profile = match profile_path {
        Some(path) => PlayerProfile::load(path)?,
        None => PlayerProfile::default(),
    };

    let mut eligibility = Eligibility::new(Arc::new(universe), config.clone());
    eligibility.refresh(&profile);
    eligibility.refresh_teleports(&profile);

    let result = find_path(&collision, eligibility.snapshot(), &config, start, &target_points);
    let out = match &result {
        PathResult::Path(path) => serde_json::json!({
            "status": "success",
            "length": path.len(),
            "path": path_json(path),
        }),
        PathResult::NoPath => serde_json::json!({ "status": "no_path" }),
        PathResult::TimedOut(partial) => serde_json::json!({
            "status": "timed_out",
            "partial": path_json(partial),
        }),
        PathResult::Cancelled(partial) => serde_json::json!({
            "status": "cancelled",
            "partial": path_json(partial),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_transport_stats(transports_dir: &PathBuf, log_level: Option<&str>) -> Result<()> {
    logging::init(log_level);
    let (universe, stats) = TransportUniverse::load_dir(transports_dir)?;
    let mut by_category = serde_json::Map::new();
    for (kind, count) in universe.kind_counts() {
        by_category.insert(kind.file_stem().to_string(), serde_json::Value::from(count));
    }
    let out = serde_json::json!({
        "files": stats.files,
        "rows": stats.rows,
        "dropped_rows": stats.skipped_rows,
        "transports": stats.transports,
        "teleports": universe.teleports().len(),
        "by_category": by_category,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::FindPath {
            collision_dir,
            transports_dir,
            profile,
            start,
            target,
            cutoff_ms,
            allow_wilderness,
            disable,
            log_level,
        } => {
            let mut config = SearchConfig::default();
            if let Some(ms) = cutoff_ms {
                config.cutoff_millis = ms;
            }
            if allow_wilderness {
                config.avoid_wilderness = false;
            }
            for stem in &disable {
                match TransportType::from_file_stem(stem.trim()) {
                    Some(kind) => config.set_enabled(kind, false),
                    None => bail!("unknown transport category `{}`", stem),
                }
            }
            config.log_level = log_level;
            cmd_find_path(&collision_dir, &transports_dir, profile.as_ref(), &start, &target, config)
        }
        Commands::TransportStats { transports_dir, log_level } => {
            cmd_transport_stats(&transports_dir, log_level.as_deref())
        }
    }
}
