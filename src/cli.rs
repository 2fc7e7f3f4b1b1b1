use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initializes the database
    Init,
    /// Starts the crawler
    Crawl {
        /// Seed URLs to start crawling from. If omitted, active scopes'
        /// patterns are used as seeds instead.
        seeds: Vec<String>,
        /// Comma-separated keywords that bias the frontier and priority
        /// scorer toward matching URLs/anchor contexts.
        #[arg(long)]
        keywords: Option<String>,
        /// Override the configured worker count.
        #[arg(long)]
        workers: Option<usize>,
        /// Override the configured per-worker page budget.
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Lists all crawl scopes
    Scopes,
    /// Adds a new crawl scope
    Add {
        /// URL pattern to add (e.g., https://example.com/*)
        pattern: String,
    },
    /// Removes a crawl scope by ID
    #[command(alias = "rm")]
    Remove {
        /// ID of the scope to remove
        id: i64,
    },
    /// Sets properties of a crawl scope
    Set {
        /// ID of the scope to modify
        id: i64,
        /// Property to set (method)
        property: String,
        /// Value to set
        value: String,
    },
}