mod commands;
mod keys;
mod output;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    Project, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_LOCK_CONTENDED, EXIT_STORE_ERROR,
};
use extforge_core::install_signal_handler;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "extforge",
    version,
    about = "Build orchestrator for multi-target browser extensions"
)]
struct Cli {
    /// Project root containing extforge.toml.
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build every target into the output directory.
    Build {
        /// Ignore the snapshot cache and rebuild from scratch.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Skip the formatter runs around the build.
        #[arg(long, default_value_t = false)]
        no_format: bool,
    },
    /// Run the watcher with keypress control (q, r, b).
    #[command(visible_alias = "watch")]
    Dev,
    /// Full build in packaging mode, then one archive per target.
    #[command(visible_aliases = ["package", "zip"])]
    Archive,
    /// Run the configured formatter.
    Format,
    /// Run the configured asset generator.
    Assets,
    /// Write a starter extforge.toml.
    Init {
        /// Preset to start from.
        #[arg(long, default_value = "extension")]
        preset: String,
        /// Overwrite an existing extforge.toml.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Remove a command lock left behind by a crashed process.
    Unlock {
        /// Lock id (build, format, dev, ...).
        id: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Watch loop run by `dev` in a subprocess.
    #[command(hide = true)]
    WatchWorker,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("EXTFORGE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let json_output = cli.json;
    let root = cli.project;

    let result = match cli.command {
        Commands::Build { force, no_format } => Project::open(&root)
            .and_then(|p| commands::build::run(&p, force, no_format, json_output)),
        Commands::Dev => Project::open(&root).and_then(|p| commands::dev::run(&p)),
        Commands::Archive => {
            Project::open(&root).and_then(|p| commands::archive::run(&p, json_output))
        }
        Commands::Format => {
            Project::open(&root).and_then(|p| commands::format::run(&p, json_output))
        }
        Commands::Assets => {
            Project::open(&root).and_then(|p| commands::assets::run(&p, json_output))
        }
        Commands::Init { preset, force } => commands::init::run(&root, &preset, force, json_output),
        Commands::Unlock { id } => {
            Project::open(&root).and_then(|p| commands::unlock::run(&p, &id, json_output))
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::WatchWorker => Project::open(&root).and_then(|p| commands::watch_worker::run(&p)),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.contains("is locked by another process") {
        EXIT_LOCK_CONTENDED
    } else if msg.starts_with("config error:")
        || msg.starts_with("manifest error:")
        || msg.starts_with("failed to parse project config")
        || msg.starts_with("failed to read project config")
    {
        EXIT_CONFIG_ERROR
    } else if msg.starts_with("cache error:") {
        EXIT_STORE_ERROR
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn aliases_parse_to_the_same_command() {
        for alias in ["archive", "package", "zip"] {
            let cli = Cli::try_parse_from(["extforge", alias]).unwrap();
            assert!(matches!(cli.command, Commands::Archive));
        }
        let cli = Cli::try_parse_from(["extforge", "watch"]).unwrap();
        assert!(matches!(cli.command, Commands::Dev));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["extforge", "deploy"]).is_err());
    }

    #[test]
    fn exit_codes_follow_message_prefix() {
        assert_eq!(
            exit_code_for("'build' is locked by another process (pid 42)"),
            EXIT_LOCK_CONTENDED
        );
        assert_eq!(exit_code_for("config error: bad"), EXIT_CONFIG_ERROR);
        assert_eq!(
            exit_code_for("manifest error: missing required field 'name'"),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(exit_code_for("cache error: io"), EXIT_STORE_ERROR);
        assert_eq!(exit_code_for("runtime error: 'zip' exited"), EXIT_FAILURE);
    }
}
