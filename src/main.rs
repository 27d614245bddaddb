use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use moddoc::cache::{GitCli, MirrorLock, MirrorState, SyncManager};
use moddoc::config::{Config, default_config_path};
use moddoc::protocol::{self, Request};
use moddoc::provider::ProviderRegistry;
use moddoc::types::MirrorKey;

#[derive(Parser)]
#[command(
    name = "moddoc",
    version,
    about = "Mod development documentation from local git mirrors"
)]
struct Cli {
    /// Configuration file (default: per-user config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage directory for mirrors
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List providers and their versions
    Providers,

    /// Print the document tree of a version
    Structure { provider: String, version: String },

    /// Print the full text of a document
    Content {
        provider: String,
        version: String,
        path: String,
    },

    /// Print the preview of a document
    Preview {
        provider: String,
        version: String,
        path: String,
    },

    /// Sync a version's mirror
    Sync {
        provider: String,
        version: String,
        /// Refresh even if the mirror is fresh
        #[arg(long)]
        force: bool,
    },

    /// Check git and mirror state
    Doctor,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.cache_dir {
        config.cache_dir = Some(dir);
    }

    let request = match cli.command {
        Commands::Doctor => return cmd_doctor(&config, cli.config.as_deref()),
        Commands::Providers => Request::GetProviders,
        Commands::Structure { provider, version } => Request::GetStructure { provider, version },
        Commands::Content {
            provider,
            version,
            path,
        } => Request::GetFullContent {
            provider,
            version,
            path,
        },
        Commands::Preview {
            provider,
            version,
            path,
        } => Request::GetPreview {
            provider,
            version,
            path,
        },
        Commands::Sync {
            provider,
            version,
            force,
        } => Request::Sync {
            provider,
            version,
            force,
        },
    };

    let registry = ProviderRegistry::from_config(&config)?;
    let response = protocol::dispatch(&registry, request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn cmd_doctor(
    config: &Config,
    config_arg: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("moddoc System Check\n");

    let git = GitCli::new();
    let git_ok = git.is_available();
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    match Config::source_path(config_arg) {
        Some(path) => println!("[OK] Config: {}", path.display()),
        None => println!(
            "[INFO] Config: built-in defaults (no {})",
            default_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "per-user config directory".into())
        ),
    }

    let paths = config.cache_paths();
    let cache_ok = paths.root().exists();
    println!(
        "[{}] Cache dir: {}",
        if cache_ok { "OK" } else { "INFO" },
        paths.root().display()
    );

    let sync = SyncManager::new(paths, Arc::new(git));
    for provider in &config.providers {
        let max_age = provider
            .max_age_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| config.max_age());

        for version in provider.effective_versions() {
            let key = MirrorKey::new(provider.name.clone(), version.id.clone());
            let (tag, state) = match sync.state(&key, max_age) {
                MirrorState::NeverSynced => ("INFO", "never synced".to_string()),
                MirrorState::Fresh { age } => {
                    ("OK", format!("fresh ({} old)", format_duration(age.as_secs())))
                }
                MirrorState::Stale { age: Some(age) } => {
                    ("INFO", format!("stale ({} old)", format_duration(age.as_secs())))
                }
                MirrorState::Stale { age: None } => ("INFO", "stale (no sync record)".to_string()),
            };
            println!("[{}] {}: {}", tag, key, state);
            if let Some(holder) = MirrorLock::holder(sync.paths(), &key) {
                println!("[INFO] {}: locked ({})", key, holder);
            }
        }
    }

    if !git_ok {
        std::process::exit(1);
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
