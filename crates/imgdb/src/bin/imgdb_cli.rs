//! Manual exercising tool for an imgdb database file: inspect counts,
//! dump image lists, and run ad-hoc maintenance without writing a test.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use imgdb::{DbSpace, Mode};

#[derive(Parser)]
#[command(name = "imgdb-cli", about = "Inspect an imgdb database file")]
struct Cli {
    /// Database file to open.
    path: PathBuf,

    /// Mode to open the database in.
    #[arg(long, default_value = "normal")]
    mode: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the number of live images.
    Count,
    /// List every live image id.
    List,
    /// Rebuild buckets from the signature cache (normal mode only).
    Rehash,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "imgdb-cli failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> imgdb::Result<()> {
    let mode = Mode::from_name(&cli.mode)?;
    let mut db = DbSpace::load(&cli.path, mode)?;

    match cli.command {
        Command::Count => println!("{}", db.len()),
        Command::List => {
            for id in db.image_id_list() {
                println!("{id}");
            }
        }
        Command::Rehash => {
            db.rehash()?;
            db.save(&cli.path)?;
        }
    }
    Ok(())
}
