//! keel - a Git-compatible version control CLI.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Keel - content-addressed version control
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new repository
    Init {
        /// Directory to initialize (default: current directory)
        path: Option<String>,
    },

    /// Clone a repository from a smart-HTTP URL
    Clone {
        /// Repository URL
        url: String,
        /// Destination directory
        path: Option<String>,
    },

    /// Stage file contents
    Add {
        /// Paths to stage
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Move or rename a staged file
    Mv {
        /// Source path
        from: String,
        /// Destination path
        to: String,
    },

    /// Restore a file from HEAD
    Restore {
        /// Paths to restore
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove a file from the index and working directory
    Rm {
        /// Paths to remove
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Record the staged tree as a commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// Show the staging status
    Status,

    /// Show commit history
    Log {
        /// Limit the number of commits shown
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show a commit
    Show {
        /// Revision to show (default: HEAD)
        revision: Option<String>,
    },

    /// List, create, or delete branches
    Branch {
        /// Branch to create
        name: Option<String>,
        /// Delete the named branch
        #[arg(short, long)]
        delete: bool,
    },

    /// Switch branches (alias of switch)
    Checkout {
        /// Branch name
        branch: String,
    },

    /// Switch branches
    Switch {
        /// Branch name
        branch: String,
    },

    /// Merge a revision into the current branch
    Merge {
        /// Revision to merge
        revision: String,
    },

    /// Replay local commits onto another revision
    Rebase {
        /// Revision to rebase onto
        revision: String,
    },

    /// Reset HEAD's index (and branch with --hard) to a revision
    Reset {
        /// Target revision
        revision: String,
        /// Also move the branch and working tree
        #[arg(long)]
        hard: bool,
    },

    /// List or create tags
    Tag {
        /// Tag to create
        name: Option<String>,
        /// Annotation message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Download objects and refs from a remote
    Fetch {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
    },

    /// Fetch and merge the current branch's remote counterpart
    Pull {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
    },

    /// Update a remote branch with local commits
    Push {
        /// Remote name
        #[arg(default_value = "origin")]
        remote: String,
        /// Branch to push (default: current)
        branch: Option<String>,
        /// Allow non-fast-forward updates
        #[arg(short, long)]
        force: bool,
    },

    /// Manage remotes
    Remote {
        #[command(subcommand)]
        command: Option<RemoteCommands>,
    },
}

#[derive(Subcommand, Debug)]
enum RemoteCommands {
    /// Add a remote
    Add {
        /// Remote name
        name: String,
        /// Remote URL
        url: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("keel={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(path.as_deref()),
        Commands::Clone { url, path } => commands::clone(&url, path.as_deref()),
        Commands::Add { paths } => commands::add(&paths),
        Commands::Mv { from, to } => commands::mv(&from, &to),
        Commands::Restore { paths } => commands::restore(&paths),
        Commands::Rm { paths } => commands::rm(&paths),
        Commands::Commit { message } => commands::commit(&message),
        Commands::Status => commands::status(),
        Commands::Log { limit } => commands::log(limit),
        Commands::Show { revision } => commands::show(revision.as_deref()),
        Commands::Branch { name, delete } => commands::branch(name.as_deref(), delete),
        Commands::Checkout { branch } | Commands::Switch { branch } => commands::switch(&branch),
        Commands::Merge { revision } => commands::merge(&revision),
        Commands::Rebase { revision } => commands::rebase(&revision),
        Commands::Reset { revision, hard } => commands::reset(&revision, hard),
        Commands::Tag { name, message } => commands::tag(name.as_deref(), message.as_deref()),
        Commands::Fetch { remote } => commands::fetch(&remote),
        Commands::Pull { remote } => commands::pull(&remote),
        Commands::Push {
            remote,
            branch,
            force,
        } => commands::push(&remote, branch.as_deref(), force),
        Commands::Remote { command } => match command {
            Some(RemoteCommands::Add { name, url }) => commands::remote_add(&name, &url),
            None => commands::remote_list(),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
