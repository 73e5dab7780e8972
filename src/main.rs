use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use face_unlock::cli::{self, Context};
use face_unlock::common::{current_username, validate_username, SystemClock};
use face_unlock::core::{capture_template, LoggingObserver, SampleAggregator};

#[derive(Parser)]
#[command(name = "face-unlock")]
#[command(about = "Face authentication and presence guard for the desktop session")]
struct Cli {
    /// Enable development mode (keeps data under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and store a face template
    Enroll {
        #[arg(short, long)]
        user: Option<String>,
        /// Override the configured number of samples
        #[arg(short, long)]
        samples: Option<usize>,
    },
    /// Delete a stored template
    Remove {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Run one authentication attempt in this process
    Auth {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show enrollment and guard settings
    Status {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Run the presence guardian in the foreground
    Guard {
        #[arg(short, long)]
        user: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    cli::init_logging(args.verbose || args.dev);

    let context = Context::load(args.dev)?;

    match args.command {
        Commands::Enroll { user, samples } => {
            let username = resolve_user(user)?;
            enroll(&context, &username, samples)?;
        }
        Commands::Remove { user } => {
            let username = resolve_user(user)?;
            if context.store().delete(&username)? {
                println!("Removed face template for {}", username);
            } else {
                println!("No face template stored for {}", username);
            }
        }
        Commands::Auth { user } => {
            let username = resolve_user(user)?;
            println!("Testing authentication for: {}", username);
            cli::install_signal_handlers();
            let outcome = context.attempt(&username, cli::signal_cancel_token(), &mut LoggingObserver);
            if let Some(distance) = outcome.best_distance.filter(|d| d.is_finite()) {
                println!("Best distance: {:.3}", distance);
            }
            println!("Frames analysed: {}", outcome.frames);
            println!("Result: {}", outcome.result);
            std::process::exit(outcome.result.exit_code());
        }
        Commands::Status { user } => {
            let username = resolve_user(user)?;
            status(&context, &username);
        }
        Commands::Guard { user } => {
            let username = resolve_user(user)?;
            cli::install_signal_handlers();
            let mut guardian = context.guardian(&username);
            guardian.run(&cli::SHUTDOWN);
        }
    }

    Ok(())
}

fn resolve_user(user: Option<String>) -> Result<String> {
    let username = match user {
        Some(name) => name,
        None => current_username()?,
    };
    validate_username(&username)?;
    Ok(username)
}

fn enroll(context: &Context, username: &str, samples: Option<usize>) -> Result<()> {
    let enrollment = &context.config.enrollment;
    let samples = samples.unwrap_or(enrollment.samples);
    if samples == 0 {
        bail!("At least one sample is needed");
    }

    println!("Enrolling {}: look at the camera ({} samples)", username, samples);
    let mut aggregator = SampleAggregator::new(
        Duration::from_millis(enrollment.min_interval_ms),
        enrollment.warmup_ticks,
    );
    let mut perception = context.perception();
    let template = capture_template(
        &mut perception,
        &mut aggregator,
        samples,
        Duration::from_secs(enrollment.deadline_seconds),
        SystemClock,
        &mut |collected, wanted| println!("  captured {}/{}", collected, wanted),
    )?;

    context.store().save(username, &template)?;
    println!("✅ Enrolled {} with {} encodings", username, template.len());
    Ok(())
}

fn status(context: &Context, username: &str) {
    let runtime = context.runtime();
    let store = context.store();

    println!("User:            {}", username);
    match store.load(username) {
        Ok(template) => println!("Enrolled:        yes ({} encodings)", template.len()),
        Err(e) => println!("Enrolled:        no ({})", e),
    }
    println!("Templates:       {}", store.dir().display());
    println!("Guard enabled:   {}", runtime.guard_enabled);
    println!("Warning delay:   {}s", runtime.warning_delay.as_secs());
    println!("Lock delay:      {}s", runtime.lock_delay.as_secs());
    println!("Threshold:       {:.2}", runtime.threshold);
    println!("Timeout:         {}s", runtime.timeout.as_secs());
    println!("Camera:          /dev/video{}", context.config.camera.device_index);
    println!("Models:          {}", context.paths.models_dir().display());
}
