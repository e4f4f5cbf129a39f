//! Generator binary entrypoint: argument parsing, logging setup and
//! engine dispatch. The full pipeline lives in the library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use asgen::config::Config;
use asgen::engine::Engine;

/// AppStream metadata generator for distribution archives
#[derive(Parser, Debug)]
#[command(name = "asgen")]
#[command(version)]
#[command(about = "Generate AppStream catalog metadata from distribution repositories", long_about = None)]
struct Args {
    /// Show extra debugging information
    #[arg(long, short)]
    verbose: bool,

    /// Force the action, reprocessing already-known packages
    #[arg(long)]
    force: bool,

    /// Define the workspace location
    #[arg(long, short = 'w', value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Use the given configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the workspace root export directory
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process new metadata for the given distribution suite and publish it
    Run {
        /// Suite to process; all suites when omitted
        suite: Option<String>,
        /// Limit processing to one section
        section: Option<String>,
    },
    /// Process new metadata for individual package files
    ProcessFile {
        /// Suite the packages belong to
        suite: String,
        /// Section the packages belong to
        section: String,
        /// Package files to process
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Export all metadata and publish reports in the export directories
    Publish {
        /// Suite to publish
        suite: String,
        /// Limit publishing to one section
        section: Option<String>,
    },
    /// Remove old metadata and media and drop stale packages
    Cleanup,
    /// Drop all processed metadata and hints of a suite
    RemoveFound {
        /// Suite to reset
        suite: String,
    },
    /// Drop all information about a (partial) package-id
    Forget {
        /// Package ID (`name/version/arch`) or package-name prefix
        pkid: String,
    },
    /// Show the information associated with a (full) package-id
    Info {
        /// Package ID in the form `name/version/arch`
        pkid: String,
    },
}

/// Some of the tools we may spawn expect `XDG_RUNTIME_DIR` to exist when
/// it is announced; containerized environments tend to skip creating it.
fn create_xdg_runtime_dir() {
    let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") else {
        return;
    };
    if !xdg_runtime_dir.starts_with('/') || std::path::Path::new(&xdg_runtime_dir).exists() {
        return;
    }

    if let Err(e) = std::fs::create_dir_all(&xdg_runtime_dir) {
        tracing::warn!(dir = %xdg_runtime_dir, error = %e, "unable to create XDG runtime dir");
        return;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ =
            std::fs::set_permissions(&xdg_runtime_dir, std::fs::Permissions::from_mode(0o700));
    }
    tracing::debug!(dir = %xdg_runtime_dir, "created missing XDG runtime dir");
}

fn execute_command(engine: &Engine, command: &Command) -> anyhow::Result<bool> {
    match command {
        Command::Run { suite, section } => {
            match suite {
                Some(suite) => engine.run(suite, section.as_deref())?,
                None => engine.run_all()?,
            }
            Ok(true)
        }
        Command::ProcessFile {
            suite,
            section,
            files,
        } => {
            engine.process_file(suite, section, files)?;
            Ok(true)
        }
        Command::Publish { suite, section } => {
            engine.publish(suite, section.as_deref())?;
            Ok(true)
        }
        Command::Cleanup => {
            engine.run_cleanup()?;
            Ok(true)
        }
        Command::RemoveFound { suite } => {
            engine.remove_hints_components(suite)?;
            Ok(true)
        }
        Command::Forget { pkid } => {
            engine.forget_package(pkid)?;
            Ok(true)
        }
        Command::Info { pkid } => engine.print_package_info(pkid),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // resolve the configuration file: explicit flag, workspace, or cwd
    let config_fname = args.config.clone().unwrap_or_else(|| {
        let workspace = args
            .workspace
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
        workspace.join("asgen-config.json")
    });

    let conf = match Config::load(
        &config_fname,
        args.workspace.as_deref(),
        args.export_dir.as_deref(),
    ) {
        Ok(conf) => Arc::new(conf),
        Err(e) => {
            eprintln!("Unable to load configuration: {e:#}");
            return ExitCode::from(4);
        }
    };

    create_xdg_runtime_dir();

    let mut engine = match Engine::new(conf) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Unable to initialize the generator: {e:#}");
            return ExitCode::from(1);
        }
    };
    engine.set_forced(args.force);

    match execute_command(&engine, &args.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
