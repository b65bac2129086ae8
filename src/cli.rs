use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "ephist",
    version,
    about = "Keep a retention-bounded history of watched anime episodes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the history panel (default)
    Panel,
    /// Record a progress update for a media entry
    Progress {
        #[arg(long)]
        media_id: Option<u64>,
        #[arg(long, allow_negative_numbers = true)]
        progress: Option<i64>,
    },
    /// Run the retention check and exit
    Activate,
    /// Print one page of the history
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        per_page: Option<usize>,
        #[arg(long, value_enum, default_value_t = SortField::Date)]
        sort: SortField,
        #[arg(long, conflicts_with = "desc")]
        asc: bool,
        #[arg(long)]
        desc: bool,
    },
    /// Edit and save the retention settings
    Settings {
        /// Days to keep history; 0 disables automatic deletion
        #[arg(long)]
        cache_for: Option<String>,
        #[arg(long, action = ArgAction::Set)]
        compact: Option<bool>,
    },
    /// Delete the whole history now
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortField {
    Name,
    Date,
}
