use anyhow::{Context as _, Result};
use clap::Parser;

use face_unlock::cli::{self, Context};
use face_unlock::common::{current_username, validate_username};

/// Locks the session when the enrolled user walks away.
#[derive(Parser)]
#[command(name = "face-unlock-guardian")]
struct Args {
    /// User whose session is guarded (defaults to the caller)
    #[arg(short, long)]
    user: Option<String>,

    #[arg(long)]
    dev: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(args.verbose);

    let username = match args.user {
        Some(user) => user,
        None => current_username().context("Cannot determine the user to guard")?,
    };
    validate_username(&username)?;

    let context = Context::load(args.dev)?;
    cli::install_signal_handlers();

    let mut guardian = context.guardian(&username);
    guardian.run(&cli::SHUTDOWN);
    Ok(())
}
