//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload, sign, download and verify files", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Write logs to signbox.log in the cache directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Log in and start a session
    Login {
        /// Account email (defaults to SIGNBOX_EMAIL or the last one used)
        #[arg(long)]
        email: Option<String>,
        /// Remember the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Create an account and start a session
    Register {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// End the session
    Logout {
        /// Also delete the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show whether a session is active and when it expires
    Status,
    /// List your files
    List,
    /// Show details of one file
    Info { id: String },
    /// Upload a file
    Upload {
        path: PathBuf,
        /// Ask the server to sign the file
        #[arg(long)]
        sign: bool,
    },
    /// Download a file
    Download {
        id: String,
        /// Where to write the file (defaults to the server-provided name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check the signature of one or more local files
    Verify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print verdicts as JSON
        #[arg(long)]
        json: bool,
    },
}
