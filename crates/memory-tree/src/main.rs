// memory-tree/crates/memory-tree/src/main.rs

use clap::Parser;
use dotenvy::dotenv;
use memory_tree::{config::Config, run_server};
use std::path::PathBuf;

/// Branching conversation memory server
#[derive(Debug, Parser)]
#[command(name = "memory-tree", version, about)]
struct Args {
    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Bind host (overrides API_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides API_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Refuse to start instead of wiping a database with a different schema version
    #[arg(long)]
    no_destructive_reset: bool,
}

impl Args {
    fn apply(self, cfg: &mut Config) {
        if let Some(path) = self.db_path {
            cfg.database_path = path;
        }
        if let Some(host) = self.host {
            cfg.api_host = host;
        }
        if let Some(port) = self.port {
            cfg.api_port = port;
        }
        if self.no_destructive_reset {
            cfg.allow_destructive_reset = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let mut cfg = Config::from_env()?;
    args.apply(&mut cfg);

    run_server(cfg).await
}
