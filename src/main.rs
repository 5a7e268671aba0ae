//! classreg - run Lua scripts against the class registry

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use classreg::lua::Sandbox;
use classreg::{ClassRegistry, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Define classes from Lua scripts and inspect the resulting registry
#[derive(Parser, Debug)]
#[command(name = "classreg", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the class hierarchy after running the scripts
    #[arg(long)]
    list: bool,

    /// Print class descriptions as JSON after running the scripts
    #[arg(long, conflicts_with = "list")]
    json: bool,

    /// Lua scripts to run, in order, in one shared state
    #[arg(required = true)]
    scripts: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = ClassRegistry::global();
    let mut sandbox = Sandbox::new(config.sandbox.clone(), registry.clone())
        .map_err(|e| anyhow!("Failed to create Lua sandbox: {e}"))?;

    for script in &args.scripts {
        if !script.exists() {
            bail!("Script not found: {}", script.display());
        }
        let source = std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read {}", script.display()))?;
        sandbox
            .execute_named(&script.display().to_string(), &source)
            .map_err(|e| anyhow!("Script {} failed: {e}", script.display()))?;
        info!(script = %script.display(), classes = registry.len(), "script finished");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&registry.describe_all())?);
    } else if args.list {
        print!("{}", registry.render_tree());
    }

    Ok(())
}
