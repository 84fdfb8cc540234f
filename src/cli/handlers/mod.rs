use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use crate::analysis::{AnalysisProvider, GpxAnalyzer};
use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::lock::{CatalogLock, DEFAULT_LOCK_TIMEOUT};
use crate::io::recovery::{prune_recovery, read_recovery_entries, recovery_log_path};
use crate::io::watcher::TrackWatcher;
use crate::model::bounds::Bounds;
use crate::model::config::{CatalogConfig, parse_color};
use crate::model::track::{ColoringType, TrackRecord, TrackWidth};
use crate::store::{Reconciled, TrackCatalog, apply_event_locked};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Resolved config and catalog location for one invocation
struct Context {
    config: CatalogConfig,
    catalog_path: PathBuf,
    json: bool,
}

impl Context {
    fn analyzer(&self) -> GpxAnalyzer {
        GpxAnalyzer::new(self.config.analysis.moving_speed_threshold)
    }

    /// Load the catalog. Callers that mutate take the lock first.
    fn open(&self) -> Arc<TrackCatalog> {
        let catalog = Arc::new(TrackCatalog::new(
            self.catalog_path.clone(),
            self.config.clone(),
            Arc::new(self.analyzer()),
        ));
        catalog.load();
        catalog
    }

    fn lock(&self) -> Result<CatalogLock, Box<dyn std::error::Error>> {
        Ok(CatalogLock::acquire_default(&self.catalog_path)?)
    }
}

/// With autosave off, mutations only mark the catalog dirty; a CLI
/// invocation still has to leave them on disk.
fn flush(catalog: &TrackCatalog) -> CmdResult {
    if catalog.is_dirty() {
        catalog.save()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let config = match &cli.config {
        Some(path) => config_io::read_config_from(Path::new(path))?,
        None => config_io::read_config()?,
    };
    let catalog_path = match &cli.catalog {
        Some(path) => PathBuf::from(path),
        None => config_io::resolve_catalog_path(&config),
    };
    log::debug!("using catalog {}", catalog_path.display());
    let ctx = Context {
        config,
        catalog_path,
        json: cli.json,
    };

    match cli.command {
        // Read commands
        Commands::List => cmd_list(&ctx),
        Commands::Show(args) => cmd_show(&ctx, args),
        Commands::Dir(args) => cmd_dir(&ctx, args),
        Commands::Recovery(args) => cmd_recovery(&ctx, args),

        // Write commands
        Commands::Add(args) => cmd_add(&ctx, args),
        Commands::Remove(args) => cmd_remove(&ctx, args),
        Commands::Color(args) => cmd_color(&ctx, args),
        Commands::Style(args) => cmd_style(&ctx, args),
        Commands::HideGroup(args) => cmd_hidden_group(&ctx, args, true),
        Commands::ShowGroup(args) => cmd_hidden_group(&ctx, args, false),
        Commands::MvFolder(args) => cmd_mv_folder(&ctx, args),
        Commands::Reload(args) => cmd_reload(&ctx, args),
        Commands::Watch(args) => cmd_watch(&ctx, args),
    }
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_list(ctx: &Context) -> CmdResult {
    let catalog = ctx.open();
    let items = catalog.items();
    if ctx.json {
        let results: Vec<TrackSummaryJson> = items.iter().map(track_to_summary).collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if items.is_empty() {
        println!("no tracks in {}", catalog.path().display());
    } else {
        for record in &items {
            println!("{}", format_track_line(record));
        }
    }
    Ok(())
}

/// Look a track up by path first, then by bare file name.
fn find_track(catalog: &TrackCatalog, key: &str) -> Option<TrackRecord> {
    catalog
        .get_item(key)
        .or_else(|| catalog.get_item_by_file_name(key))
}

fn cmd_show(ctx: &Context, args: ShowArgs) -> CmdResult {
    let catalog = ctx.open();
    let record =
        find_track(&catalog, &args.key).ok_or_else(|| format!("track not found: {}", args.key))?;
    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        for line in format_track_detail(&record) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_dir(ctx: &Context, args: PathArgs) -> CmdResult {
    let catalog = ctx.open();
    if !catalog.contains_item(&args.path) {
        return Err(format!("track not found: {}", args.path).into());
    }
    println!("{}", catalog.get_file_dir(&args.path));
    Ok(())
}

fn cmd_recovery(ctx: &Context, args: RecoveryArgs) -> CmdResult {
    let log_path = recovery_log_path(&ctx.catalog_path);
    if args.path {
        println!("{}", log_path.display());
        return Ok(());
    }
    if args.prune {
        let before = args
            .older_than
            .map(|days| chrono::Utc::now() - chrono::Duration::days(days));
        let removed = prune_recovery(&log_path, before, args.all)?;
        if ctx.json {
            println!("{}", serde_json::json!({ "removed": removed }));
        } else {
            println!("removed {} recovery entries", removed);
        }
        return Ok(());
    }
    let entries = read_recovery_entries(&log_path, Some(args.limit));
    if ctx.json {
        let values: Vec<serde_json::Value> = entries.iter().map(|e| e.to_json()).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
    } else if entries.is_empty() {
        println!("recovery log is empty");
    } else {
        for entry in &entries {
            print!("{}", entry.to_markdown());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_add(ctx: &Context, args: AddArgs) -> CmdResult {
    let file = std::fs::canonicalize(&args.file)
        .map_err(|e| format!("cannot resolve '{}': {}", args.file, e))?;
    let analysis = if args.no_analysis {
        None
    } else {
        Some(ctx.analyzer().compute(&file)?)
    };

    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    let path = file.to_string_lossy();
    let record = catalog.add_track_item(&path, &args.title, &args.desc, Bounds::empty(), analysis)?;
    flush(&catalog)?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&track_to_summary(&record))?);
    } else {
        println!("{}", format_track_line(&record));
    }
    Ok(())
}

fn cmd_remove(ctx: &Context, args: RemoveArgs) -> CmdResult {
    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    let removed = catalog.remove_item(&args.path, args.delete_file)?;
    flush(&catalog)?;
    if !removed {
        eprintln!("not in catalog: {}", args.path);
    }
    Ok(())
}

fn cmd_color(ctx: &Context, args: ColorArgs) -> CmdResult {
    let color = parse_color(&args.color)
        .ok_or_else(|| format!("invalid color '{}': expected #AARRGGBB or #RRGGBB", args.color))?;

    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    let record = catalog
        .get_item(&args.path)
        .ok_or_else(|| format!("track not found: {}", args.path))?;
    catalog.update_color(&record, color)?;
    flush(&catalog)
}

fn cmd_style(ctx: &Context, args: StyleArgs) -> CmdResult {
    if let Some(width) = &args.width
        && TrackWidth::parse(width).is_none()
    {
        return Err(format!("invalid width '{}': expected thin, medium, bold or pixels", width).into());
    }
    if let Some(coloring) = &args.coloring
        && ColoringType::parse(coloring).is_none()
    {
        return Err(format!(
            "invalid coloring '{}': expected solid, speed, altitude or slope",
            coloring
        )
        .into());
    }

    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    let record = catalog
        .get_item(&args.path)
        .ok_or_else(|| format!("track not found: {}", args.path))?;

    let mut style = record.style.clone();
    if let Some(width) = args.width {
        style.width = width;
    }
    if let Some(coloring) = args.coloring {
        style.coloring_type = coloring;
    }
    if let Some(v) = args.start_finish {
        style.show_start_finish = v;
    }
    if let Some(v) = args.join_segments {
        style.join_segments = v;
    }
    if let Some(v) = args.arrows {
        style.show_arrows = v;
    }
    catalog.update_style(&args.path, style)?;
    flush(&catalog)
}

fn cmd_hidden_group(ctx: &Context, args: GroupArgs, hide: bool) -> CmdResult {
    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    let found = if hide {
        catalog.add_hidden_group(&args.path, &args.group)?
    } else {
        catalog.remove_hidden_group(&args.path, &args.group)?
    };
    if !found {
        return Err(format!("track not found: {}", args.path).into());
    }
    flush(&catalog)
}

fn cmd_mv_folder(ctx: &Context, args: MvFolderArgs) -> CmdResult {
    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    let moved = catalog.update_folder_name(&args.new, &args.old)?;
    flush(&catalog)?;
    if ctx.json {
        let result = MoveResultJson {
            old: args.old,
            new: args.new,
            moved,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !moved {
        eprintln!("no tracks under {}", args.old);
    }
    Ok(())
}

fn cmd_reload(ctx: &Context, args: PathArgs) -> CmdResult {
    let _lock = ctx.lock()?;
    let catalog = ctx.open();
    if !catalog.contains_item(&args.path) {
        return Err(format!("track not found: {}", args.path).into());
    }

    let (tx, rx) = mpsc::channel();
    catalog.reload_file(&args.path, move |result| {
        let _ = tx.send(result.as_ref().map_err(|e| e.to_string()).err());
    });
    if let Some(err) = rx.recv()? {
        return Err(err.into());
    }
    flush(&catalog)?;

    if let Some(record) = catalog.get_item(&args.path) {
        if ctx.json {
            println!("{}", serde_json::to_string_pretty(&track_to_summary(&record))?);
        } else {
            println!("{}", format_track_line(&record));
        }
    }
    Ok(())
}

fn cmd_watch(ctx: &Context, args: WatchArgs) -> CmdResult {
    let root = match args.dir {
        Some(dir) => PathBuf::from(dir),
        None => ctx
            .config
            .catalog
            .tracks_root
            .clone()
            .ok_or("no folder given and no tracks_root configured")?,
    };
    let root = std::fs::canonicalize(&root)
        .map_err(|e| format!("cannot resolve '{}': {}", root.display(), e))?;

    let catalog = ctx.open();
    let watcher = TrackWatcher::start(&root)?;
    eprintln!("watching {} (ctrl-c to stop)", root.display());

    loop {
        let Some(event) = watcher.next_timeout(Duration::from_secs(1)) else {
            continue;
        };
        match apply_event_locked(&catalog, &event, DEFAULT_LOCK_TIMEOUT) {
            Ok(Reconciled::Ignored) => {}
            Ok(outcome) => log::info!("{:?} after {:?}", outcome, event),
            Err(e) => log::warn!("could not apply {:?}: {}", event, e),
        }
    }
}
