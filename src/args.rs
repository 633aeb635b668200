use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quiz-chain")]
#[command(about = "Solves chains of web quiz pages with generated programs")]
#[command(version)]
pub struct Args {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum crawl depth from each quiz page
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,

    /// Directory for attachments, sandbox runs and the failure log
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Solve a chain starting at URL and exit
    Run {
        url: String,
    },
    /// Accept jobs over HTTP
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:8000
        #[arg(short, long)]
        bind: Option<String>,
    },
}
