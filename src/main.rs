use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use vessel::home::AppHome;
use vessel::{create, delete, enter, exec, inspect, list, logger, rename, start, stop};

/// A minimal rootless container runtime.
#[derive(Parser, Debug)]
#[command(name = "vessel", version, about)]
struct Opts {
    /// Data root holding containers, images and companion binaries.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Log verbosity: error, warn, info, debug or trace.
    #[arg(long, global = true, default_value = "warn")]
    log_level: log::LevelFilter,
    #[command(subcommand)]
    subcmd: SubCommand,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Create a container from an image.
    Create(create::Create),
    /// Start a created container.
    Start(start::Start),
    /// Run a command inside a running container.
    Exec(exec::Exec),
    /// Stop a running container.
    Stop(stop::Stop),
    /// Rename a container.
    Rename(rename::Rename),
    /// Show detailed information about containers.
    Inspect(inspect::Inspect),
    /// List containers.
    Ps(list::List),
    /// Remove containers.
    Rm(delete::Delete),
    /// Internal: enter the prepared namespaces and exec the entrypoint.
    #[command(hide = true)]
    Enter(enter::Enter),
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    logger::init(opts.log_level)?;

    let home = AppHome::new(opts.root)?;
    fs::create_dir_all(home.containers_dir())?;

    match opts.subcmd {
        SubCommand::Create(cmd) => cmd.exec(&home)?,
        SubCommand::Start(cmd) => cmd.exec(&home)?,
        SubCommand::Exec(cmd) => cmd.exec(&home)?,
        SubCommand::Stop(cmd) => cmd.exec(&home)?,
        SubCommand::Rename(cmd) => cmd.exec(&home)?,
        SubCommand::Inspect(cmd) => cmd.exec(&home)?,
        SubCommand::Ps(cmd) => cmd.exec(&home)?,
        SubCommand::Rm(cmd) => cmd.exec(&home)?,
        SubCommand::Enter(cmd) => cmd.exec(&home)?,
    }

    Ok(())
}
