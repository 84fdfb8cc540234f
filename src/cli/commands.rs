use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gpxdb", about = concat!("gpxdb v", env!("CARGO_PKG_VERSION"), " - a catalog of your GPX tracks"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Use a different catalog file
    #[arg(short = 'c', long = "catalog", global = true)]
    pub catalog: Option<String>,

    /// Use a different config file
    #[arg(long = "config", global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List all tracks in catalog order
    List,
    /// Show one track by path or file name
    Show(ShowArgs),
    /// Add a track file to the catalog
    Add(AddArgs),
    /// Remove a track from the catalog
    Remove(RemoveArgs),
    /// Set a track's color
    Color(ColorArgs),
    /// Change a track's line style
    Style(StyleArgs),
    /// Hide a waypoint group on a track
    HideGroup(GroupArgs),
    /// Show a previously hidden waypoint group
    ShowGroup(GroupArgs),
    /// Re-key tracks after a folder was moved or renamed
    MvFolder(MvFolderArgs),
    /// Recompute a track's statistics from its file
    Reload(PathArgs),
    /// Print the folder a track lives in
    Dir(PathArgs),
    /// Watch a folder and keep the catalog in sync with it
    Watch(WatchArgs),
    /// View the recovery log
    Recovery(RecoveryArgs),
}

#[derive(Args)]
pub struct ShowArgs {
    /// Absolute track path, or a bare file name
    pub key: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Track file to add
    pub file: String,
    /// Display title
    #[arg(long, default_value = "")]
    pub title: String,
    /// Description
    #[arg(long, default_value = "")]
    pub desc: String,
    /// Skip analysis; statistics stay empty until `reload`
    #[arg(long)]
    pub no_analysis: bool,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Track path
    pub path: String,
    /// Also delete the file from disk
    #[arg(long)]
    pub delete_file: bool,
}

#[derive(Args)]
pub struct ColorArgs {
    /// Track path
    pub path: String,
    /// Color as #AARRGGBB or #RRGGBB
    pub color: String,
}

#[derive(Args)]
pub struct StyleArgs {
    /// Track path
    pub path: String,
    /// Width preset (thin, medium, bold) or pixels
    #[arg(long)]
    pub width: Option<String>,
    /// Coloring (solid, speed, altitude, slope)
    #[arg(long)]
    pub coloring: Option<String>,
    /// Show start and finish markers
    #[arg(long)]
    pub start_finish: Option<bool>,
    /// Draw all segments as one line
    #[arg(long)]
    pub join_segments: Option<bool>,
    /// Show direction arrows
    #[arg(long)]
    pub arrows: Option<bool>,
}

#[derive(Args)]
pub struct GroupArgs {
    /// Track path
    pub path: String,
    /// Waypoint group name
    pub group: String,
}

#[derive(Args)]
pub struct MvFolderArgs {
    /// Old folder path
    pub old: String,
    /// New folder path
    pub new: String,
}

#[derive(Args)]
pub struct PathArgs {
    /// Track path
    pub path: String,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Folder to watch (default: the configured tracks root)
    pub dir: Option<String>,
}

#[derive(Args)]
pub struct RecoveryArgs {
    /// Maximum number of entries to show
    #[arg(long, default_value = "10")]
    pub limit: usize,
    /// Print the path to the recovery log instead
    #[arg(long)]
    pub path: bool,
    /// Remove old entries instead of listing them
    #[arg(long)]
    pub prune: bool,
    /// With --prune: remove entries older than this many days
    #[arg(long, value_name = "DAYS", requires = "prune", conflicts_with = "all")]
    pub older_than: Option<i64>,
    /// With --prune: remove every entry
    #[arg(long, requires = "prune")]
    pub all: bool,
}
