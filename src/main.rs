use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use totw_scout::aggregate::{Aggregator, ViewFilter, ViewRow, sort_rows};
use totw_scout::config::Config;
use totw_scout::logging;
use totw_scout::normalize::season_label;
use totw_scout::remote::FotmobClient;
use totw_scout::round_cache::RoundCache;
use totw_scout::store::LocalStore;
use totw_scout::ttl_cache::CachedClient;
use totw_scout::view::{self, Row};

#[derive(Parser)]
#[command(name = "totw_scout")]
#[command(about = "Team-of-the-week player scouting from FotMob data", long_about = None)]
struct Cli {
    /// Root for cached TOTW rounds (overrides TOTW_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Player store file (overrides TOTW_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for CSV views (overrides TOTW_VIEWS_DIR)
    #[arg(long, global = true)]
    views_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch (or load) one player and print the stored record
    Player { id: u64 },
    /// List the TOTW players of one season
    Season { league_id: u64, season: i32 },
    /// Aggregate TOTW appearances over a range of seasons
    Aggregate {
        league_id: u64,
        /// First season (starting year)
        #[arg(long)]
        from: i32,
        /// Last season (starting year), inclusive
        #[arg(long)]
        until: i32,
        #[command(flatten)]
        filter: FilterArgs,
        /// Write the result to league_<id>_<until>.csv
        #[arg(long)]
        save: bool,
    },
    /// Rebuild master.csv from every saved view
    Master {
        /// Numeric field to filter on
        #[arg(long)]
        field: Option<String>,
        #[arg(long)]
        min: Option<f64>,
        #[arg(long)]
        max: Option<f64>,
        /// Also export the (filtered) table as an xlsx workbook
        #[arg(long)]
        xlsx: Option<PathBuf>,
    },
    /// Report disk usage of cached data
    Storage,
}

#[derive(Args, Default)]
struct FilterArgs {
    #[arg(long)]
    min_age: Option<u32>,
    #[arg(long)]
    max_age: Option<u32>,
    #[arg(long)]
    min_apps: Option<u64>,
    #[arg(long)]
    max_apps: Option<u64>,
    #[arg(long)]
    min_totw: Option<usize>,
    #[arg(long)]
    max_totw: Option<usize>,
    /// Minimum market value in euros
    #[arg(long)]
    min_value: Option<f64>,
    /// Maximum market value in euros
    #[arg(long)]
    max_value: Option<f64>,
    /// Position code, e.g. CB
    #[arg(long)]
    position: Option<String>,
}

impl From<FilterArgs> for ViewFilter {
    fn from(args: FilterArgs) -> Self {
        ViewFilter {
            min_age: args.min_age,
            max_age: args.max_age,
            min_apps: args.min_apps,
            max_apps: args.max_apps,
            min_totw: args.min_totw,
            max_totw: args.max_totw,
            min_market_value: args.min_value,
            max_market_value: args.max_value,
            position: args.position,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        if cli.views_dir.is_none() {
            config.views_dir = dir.join("views");
        }
        config.data_dir = dir;
    }
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(views) = cli.views_dir {
        config.views_dir = views;
    }

    match cli.command {
        Command::Player { id } => run_player(&config, id),
        Command::Season { league_id, season } => run_season(&config, league_id, season),
        Command::Aggregate {
            league_id,
            from,
            until,
            filter,
            save,
        } => run_aggregate(&config, league_id, from, until, filter.into(), save),
        Command::Master {
            field,
            min,
            max,
            xlsx,
        } => run_master(&config, field.as_deref(), min, max, xlsx.as_deref()),
        Command::Storage => run_storage(&config),
    }
}

fn open_store(config: &Config) -> Result<LocalStore> {
    LocalStore::open(&config.db_path)
        .with_context(|| format!("open player store {}", config.db_path.display()))
}

fn open_client(config: &Config) -> Result<CachedClient<FotmobClient>> {
    let client = FotmobClient::new(config).context("build api client")?;
    Ok(CachedClient::new(client))
}

fn run_player(config: &Config, id: u64) -> Result<()> {
    let store = open_store(config)?;
    let client = open_client(config)?;
    match store.get_or_fetch(&client, id)? {
        Some(record) => {
            let json = serde_json::to_string_pretty(&record).context("render player")?;
            println!("{json}");
        }
        None => println!("Player {id} not found."),
    }
    Ok(())
}

fn run_season(config: &Config, league_id: u64, season: i32) -> Result<()> {
    let store = open_store(config)?;
    let client = open_client(config)?;
    let rounds = RoundCache::new(&config.data_dir);
    let aggregator = Aggregator::new(&client, &store, &rounds, config.round_delay);

    let grouping = aggregator.group_totw(league_id, season)?;
    let build = aggregator.build_player_view(grouping.player_ids(), &grouping)?;

    let rows = build
        .rows
        .iter()
        .map(|r| {
            let mut row = Row::new();
            row.push("name", format!("{} ({})", r.name, r.id));
            row.push("positions", r.positions.clone());
            row.push("team", r.team_name.clone().unwrap_or_else(|| "n/a".to_string()));
            row.push("totw", r.totw_count.to_string());
            row
        })
        .collect::<Vec<_>>();
    print_table(&rows);

    println!(
        "League {league_id} season {}: {} players, {} skipped",
        season_label(season),
        build.rows.len(),
        build.skipped.len()
    );
    Ok(())
}

fn run_aggregate(
    config: &Config,
    league_id: u64,
    from: i32,
    until: i32,
    filter: ViewFilter,
    save: bool,
) -> Result<()> {
    if from > until {
        anyhow::bail!("--from {from} is after --until {until}");
    }
    let store = open_store(config)?;
    let client = open_client(config)?;
    let rounds = RoundCache::new(&config.data_dir);
    let aggregator = Aggregator::new(&client, &store, &rounds, config.round_delay);

    let grouping = aggregator.group_totw_range(league_id, from, until)?;
    let build = aggregator.build_player_view(grouping.player_ids(), &grouping)?;
    let fetched = build.rows.len();
    let mut rows = filter.apply(build.rows);
    sort_rows(&mut rows);

    let table: Vec<Row> = rows.iter().map(ViewRow::to_row).collect();
    print_table(&table);

    if save {
        let path = view::view_path(&config.views_dir, league_id, until);
        view::write_view(&table, &path)
            .with_context(|| format!("write view {}", path.display()))?;
        println!("Saved view: {}", path.display());
    }

    println!(
        "Seasons {from}-{until}: {} TOTW players, {fetched} resolved, {} skipped, {} after filters",
        grouping.len(),
        build.skipped.len(),
        rows.len()
    );
    Ok(())
}

fn run_master(
    config: &Config,
    field: Option<&str>,
    min: Option<f64>,
    max: Option<f64>,
    xlsx: Option<&Path>,
) -> Result<()> {
    let (path, rows) = view::write_master(&config.views_dir).context("rebuild master table")?;
    let total = rows.len();
    let rows = match field {
        Some(field) => view::apply_range_filter(rows, field, min, max),
        None => rows,
    };
    print_table(&rows);

    if let Some(out) = xlsx {
        let written = view::export_xlsx(&rows, out)
            .with_context(|| format!("export workbook {}", out.display()))?;
        println!("Exported {written} rows to {}", out.display());
    }
    println!(
        "Master: {} ({total} unique rows, {} shown)",
        path.display(),
        rows.len()
    );
    Ok(())
}

fn run_storage(config: &Config) -> Result<()> {
    let mut total = dir_size(&config.data_dir)
        .with_context(|| format!("scan {}", config.data_dir.display()))?;
    if let Ok(meta) = fs::metadata(&config.db_path) {
        total += meta.len();
    }
    println!("Total Size: {:.2} MB", total as f64 / (1024.0 * 1024.0));
    Ok(())
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

fn print_table(rows: &[Row]) {
    let Some(first) = rows.first() else {
        println!("(no rows)");
        return;
    };
    let header: Vec<&str> = first.keys().collect();
    let widths: Vec<usize> = header
        .iter()
        .map(|key| {
            rows.iter()
                .map(|row| row.get(key).unwrap_or_default().chars().count())
                .chain(std::iter::once(key.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    println!("{border}");
    let head = header
        .iter()
        .zip(&widths)
        .map(|(key, w)| format!(" {:^w$} ", key.to_uppercase(), w = *w))
        .collect::<Vec<_>>()
        .join("|");
    println!("|{head}|");
    println!("{border}");
    for row in rows {
        let line = header
            .iter()
            .zip(&widths)
            .map(|(key, w)| format!(" {:<w$} ", row.get(key).unwrap_or_default(), w = *w))
            .collect::<Vec<_>>()
            .join("|");
        println!("|{line}|");
    }
    println!("{border}");
}
