//! Privacy calculator.
//!
//! Converts between a noise multiplier and the total epsilon spent by
//! `num_of_queries` Gaussian queries.
//!
//! ```bash
//! privacy-calculator --noise-multiplier 6 --num-of-queries 100 --delta 1e-6
//! privacy-calculator --total-loss 10 --num-of-queries 100 --delta 1e-6
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use dp_transport::{calculate_privacy_loss, default_alphas, solve_noise_multiplier, DpError};

/// Map between noise multiplier and total privacy loss under RDP composition.
#[derive(Parser, Debug)]
#[command(name = "privacy-calculator", version, about, long_about = None)]
struct Args {
    /// Total privacy loss (epsilon) to solve the noise multiplier for
    #[arg(long, conflicts_with = "noise_multiplier", required_unless_present = "noise_multiplier")]
    total_loss: Option<f64>,

    /// Noise multiplier to compute the total privacy loss for
    #[arg(long)]
    noise_multiplier: Option<f64>,

    /// Number of composed queries
    #[arg(long)]
    num_of_queries: u64,

    /// Target delta
    #[arg(long, default_value_t = 1e-6)]
    delta: f64,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let alphas = default_alphas();

    let result = match (args.noise_multiplier, args.total_loss) {
        (Some(nm), _) => calculate_privacy_loss(args.num_of_queries, &alphas, nm, args.delta)
            .map(|loss| {
                if args.json {
                    serde_json::json!({
                        "noise_multiplier": nm,
                        "total_loss": loss.epsilon,
                        "best_alpha": loss.best_alpha,
                    })
                    .to_string()
                } else {
                    format!("total_loss: {} (best alpha {})", loss.epsilon, loss.best_alpha)
                }
            }),
        (None, Some(total)) => {
            solve_noise_multiplier(total, args.num_of_queries, &alphas, args.delta).map(|nm| {
                if args.json {
                    serde_json::json!({ "total_loss": total, "noise_multiplier": nm }).to_string()
                } else {
                    format!("noise multiplier: {nm}")
                }
            })
        }
        (None, None) => Err(DpError::invalid(
            "either --total-loss or --noise-multiplier is required",
        )),
    };

    match result {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "privacy calculation failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
