mod config;
mod run_cmd;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use config::CachesimConfig;
use run_cmd::RunArgs;

#[derive(Parser)]
#[command(name = "cachesim", about = "Run a cache simulation engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a cachesim config file
    Init {
        /// Path to the simulation engine executable
        #[arg(long)]
        engine: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate parameters and run the engine once
    Run {
        /// Instruction cache size in bytes
        #[arg(long)]
        icache: Option<String>,
        /// Data cache size in bytes
        #[arg(long)]
        dcache: Option<String>,
        /// Cache line size in bytes
        #[arg(long)]
        line_size: Option<String>,
        /// Cache access time in cycles
        #[arg(long)]
        access_time: Option<String>,
        /// Access sequence file
        #[arg(long)]
        trace: String,
        /// Engine executable (overrides CACHESIM_ENGINE and the config file)
        #[arg(long)]
        engine: Option<String>,
        /// Terminate the engine after this many seconds (0 disables)
        #[arg(long)]
        timeout: Option<u64>,
        /// Refuse geometries the engine is likely to reject
        #[arg(long)]
        strict: bool,
        /// Print the request that would be sent and exit
        #[arg(long)]
        dry_run: bool,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a shell completion script
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { engine, force } => {
            cmd_init(engine.as_deref(), force)?;
        }
        Commands::Run {
            icache,
            dcache,
            line_size,
            access_time,
            trace,
            engine,
            timeout,
            strict,
            dry_run,
            json,
        } => {
            let resolved = CachesimConfig::resolve(engine.as_deref(), timeout)
                .context("failed to resolve configuration")?;
            let args = RunArgs {
                icache,
                dcache,
                line_size,
                access_time,
                trace,
                strict,
                dry_run,
                json,
            };
            let code = run_cmd::run_simulation(args, &resolved).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "cachesim", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Execute the `cachesim init` command: write the config file.
fn cmd_init(engine: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let engine_path = engine
        .unwrap_or(cachesim_core::EngineCommand::DEFAULT_PROGRAM)
        .to_string();
    let cfg = config::ConfigFile {
        engine: config::EngineSection {
            path: Some(engine_path.clone()),
            ..config::EngineSection::default()
        },
        defaults: config::DefaultsSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  engine.path = {engine_path}");
    println!();
    println!("Next: run `cachesim run --trace <file>` to simulate an access sequence.");

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_keeps_numeric_flags_as_raw_text() {
        let cli = Cli::try_parse_from([
            "cachesim",
            "run",
            "--trace",
            "trace.txt",
            "--line-size",
            "abc",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                line_size, icache, ..
            } => {
                assert_eq!(line_size.as_deref(), Some("abc"));
                assert_eq!(icache, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_trace() {
        assert!(Cli::try_parse_from(["cachesim", "run"]).is_err());
    }

    #[test]
    fn init_writes_config_and_refuses_overwrite() {
        let _lock = test_util::lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let first = cmd_init(Some("/opt/sim/cache_simulator"), false);
        let second = cmd_init(None, false);
        let forced = cmd_init(None, true);
        let loaded = config::load_config();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        first.unwrap();
        assert!(second.unwrap_err().to_string().contains("already exists"));
        forced.unwrap();
        let loaded = loaded.unwrap().unwrap();
        assert_eq!(
            loaded.engine.path.as_deref(),
            Some(cachesim_core::EngineCommand::DEFAULT_PROGRAM)
        );
    }
}
