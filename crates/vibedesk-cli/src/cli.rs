use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vibedesk")]
#[command(about = "Schedule alerts, tasks, cached media and playback for VibeDesk")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the local databases
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// User scope the documents belong to
    #[arg(long, global = true, default_value = "local", value_name = "ID")]
    pub scope: String,

    /// Contact addressed by simulated alerts
    #[arg(long, global = true, value_name = "EMAIL")]
    pub contact: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Local blob cache
    Blob {
        #[command(subcommand)]
        command: BlobCommands,
    },
    /// Scheduled events
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Dashboard tasks
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Schedule alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },
    /// Load a track through the playback engine and report its states
    Play {
        /// File path, blob key (`local:...`) or http(s) URL
        source: String,
        /// Seconds to keep playing once loaded
        #[arg(long, default_value = "0")]
        seconds: u64,
        /// Playback volume between 0 and 1
        #[arg(long)]
        volume: Option<f32>,
    },
    /// Pull the remote replica of the mirror database
    Sync,
}

#[derive(Subcommand)]
pub enum BlobCommands {
    /// Store a file under a key
    Put {
        key: String,
        file: PathBuf,
    },
    /// Read the bytes stored under a key
    Get {
        key: String,
        /// Output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Add an event
    Add {
        /// Date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Time as HH:MM, 24-hour
        #[arg(long)]
        time: String,
        /// Event title
        title: Vec<String>,
    },
    /// List events in date and time order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an event
    Delete {
        /// Event ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task
    Add {
        /// Task title
        title: Vec<String>,
    },
    /// List tasks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip a task between open and done
    Toggle {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// Fire alerts for due events until interrupted
    Watch {
        /// Print system notifications as well as banners
        #[arg(long)]
        notify: bool,
    },
    /// Show what an alert looks like without touching any event
    Test {
        /// Print system notifications as well as banners
        #[arg(long)]
        notify: bool,
    },
}
