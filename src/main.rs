//! Flipchain command-line tool.
//!
//! Inspects the deterministic protocol parameters and score encoding used by
//! the flip key admission layer, and runs an end-to-end epoch demo.
//!
//! Usage:
//!   flipchain --demo                                 # run protocol demo
//!   flipchain params --network-size 1000             # session sizing for a network
//!   flipchain params --network-size 10000 --validation-time 2024-06-01T13:30:00Z
//!   flipchain score encode --points 3.5 --flips 6
//!   flipchain score decode 0x76
//!   flipchain score aggregate --history 0x65,0x54 --prior-points 10 --prior-flips 10

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flipchain::config::FlipchainConfig;
use flipchain::node::epoch::EpochSchedule;
use flipchain::score::{aggregate_scores, decode_score, encode_score};

/// Flip key admission and identity scoring for a proof-of-person chain.
#[derive(Parser, Debug)]
#[command(
    name = "flipchain",
    version,
    about = "Flip key admission and protocol parameters"
)]
struct Cli {
    /// Data directory holding `flipchain.toml`.
    #[arg(long, default_value = "./flipchain-data", global = true)]
    data_dir: PathBuf,

    /// Run the demo walkthrough.
    #[arg(long)]
    demo: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the session sizing and epoch length for a network size.
    Params {
        /// Number of identities taking part in validation.
        #[arg(long)]
        network_size: usize,

        /// Validation start (RFC 3339). Defaults to now.
        #[arg(long)]
        validation_time: Option<DateTime<Utc>>,
    },

    /// Encode, decode or aggregate packed identity scores.
    Score {
        #[command(subcommand)]
        action: ScoreAction,
    },
}

#[derive(Subcommand, Debug)]
enum ScoreAction {
    /// Pack (points, flips) into a score byte.
    Encode {
        #[arg(long)]
        points: f32,
        #[arg(long)]
        flips: u32,
    },

    /// Unpack a score byte (decimal or 0x-prefixed hex).
    Decode { byte: String },

    /// Fold a score history into a prior cumulative score.
    Aggregate {
        /// Packed score bytes, most recent last (comma-separated).
        #[arg(long, value_delimiter = ',')]
        history: Vec<String>,

        #[arg(long, default_value_t = 0.0)]
        prior_points: f32,

        #[arg(long, default_value_t = 0)]
        prior_flips: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let loaded = FlipchainConfig::read(&cli.data_dir);
    let log_filter = match &loaded {
        Ok(Some(config)) => config.node.log_filter.clone(),
        _ => FlipchainConfig::default().node.log_filter,
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Ok(Some(_)) = &loaded {
        tracing::info!("Loaded config from {}", cli.data_dir.display());
    }
    let config = FlipchainConfig::resolve(loaded);

    if cli.demo {
        flipchain::demo::run_demo(&config);
        return Ok(());
    }

    match cli.command {
        None => {
            println!("Nothing to do; see --help");
            Ok(())
        }

        Some(Command::Params {
            network_size,
            validation_time,
        }) => {
            let at = validation_time.unwrap_or_else(Utc::now);
            let schedule = EpochSchedule::compute(at, network_size);
            println!("network size:        {}", schedule.network_size);
            println!("flips per identity:  {}", schedule.flips_per_identity);
            println!(
                "short session flips: {} (+{} extra)",
                schedule.short_session_flips, schedule.short_session_extra_flips
            );
            println!("long session flips:  {}", schedule.long_session_flips);
            println!("invite quota:        {}", schedule.invite_quota);
            println!("epoch length:        {} days", schedule.epoch_days);
            println!("next validation:     {}", schedule.next_validation);
            Ok(())
        }

        Some(Command::Score { action }) => run_score_command(action),
    }
}

fn run_score_command(action: ScoreAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScoreAction::Encode { points, flips } => {
            println!("0x{:02x}", encode_score(points, flips));
        }
        ScoreAction::Decode { byte } => {
            let (points, flips) = decode_score(parse_score_byte(&byte)?);
            println!("points: {}  flips: {}", points, flips);
        }
        ScoreAction::Aggregate {
            history,
            prior_points,
            prior_flips,
        } => {
            let history = history
                .iter()
                .map(|s| parse_score_byte(s))
                .collect::<Result<Vec<u8>, _>>()?;
            if history.len() > flipchain::constants::LAST_SCORES_COUNT {
                return Err(format!(
                    "history holds {} scores, at most {} are kept",
                    history.len(),
                    flipchain::constants::LAST_SCORES_COUNT
                )
                .into());
            }
            let total = aggregate_scores(&history, prior_points, prior_flips);
            println!(
                "points: {}  flips: {}  ratio: {:.3}",
                total.points,
                total.flips,
                total.ratio()
            );
        }
    }
    Ok(())
}

fn parse_score_byte(s: &str) -> Result<u8, std::num::ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}
