//! Authentication boundary: one attempt, one terminal result.
//!
//! Exit code is 0 only on a match. With `--json` the final result is also
//! written to stdout as a single report line for the parent process.

use std::env;

use anyhow::Result;
use clap::Parser;

use face_unlock::boundary::AuthReport;
use face_unlock::cli::{self, Context};
use face_unlock::common::validate_username;
use face_unlock::core::{AuthResult, LoggingObserver};

#[derive(Parser)]
#[command(name = "face-unlock-auth")]
#[command(about = "Run a single face authentication attempt")]
struct Args {
    /// User to authenticate (defaults to PAM_USER)
    #[arg(short, long)]
    user: Option<String>,

    /// Print a JSON report line on stdout
    #[arg(long)]
    json: bool,

    #[arg(long)]
    dev: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(args.verbose);
    cli::install_signal_handlers();

    let report = match args.user.or_else(|| env::var("PAM_USER").ok()) {
        Some(username) => authenticate(&username, args.dev),
        None => {
            tracing::error!("No user given and PAM_USER is not set");
            AuthReport::bare(AuthResult::NoEncodings)
        }
    };

    if args.json {
        println!("{}", report.to_json_line());
    }
    eprintln!("Result: {}", report.result);
    std::process::exit(report.result.exit_code());
}

fn authenticate(username: &str, dev: bool) -> AuthReport {
    if let Err(e) = validate_username(username) {
        tracing::error!("Refusing to authenticate: {}", e);
        return AuthReport::bare(AuthResult::NoEncodings);
    }

    let context = match Context::load(dev) {
        Ok(context) => context,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return AuthReport::bare(AuthResult::CameraError);
        }
    };

    tracing::info!("Face authentication attempt for user: {}", username);
    let outcome = context.attempt(username, cli::signal_cancel_token(), &mut LoggingObserver);
    AuthReport::from_outcome(&outcome)
}
