use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use env_logger::Env;
use log::{error, info, Level};
use std::io::Write;

use fender::batch_processing::run_batch_prediction;
use fender::color_utils;
use fender::config::{GlobalArgs, PredictCommand, PredictConfig};
use fender::transport::MAX_ATTEMPTS;
use fender::upload::{DAMAGES_ENDPOINT, PLATES_ENDPOINT};

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Upload vehicle photos for damage and license-plate prediction
    Predict(PredictCommand),

    /// Show version information
    Version,
}

#[derive(Parser)]
#[command(name = "fender")]
#[command(about = "Vehicle damage inspection client")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn get_log_level_from_verbosity(
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::ErrorLevel>,
) -> log::LevelFilter {
    let base_level = verbosity.log_level_filter();
    let adjusted_level = match base_level {
        log::LevelFilter::Off => log::LevelFilter::Off, // -qq -> OFF
        log::LevelFilter::Error => log::LevelFilter::Warn, // default -> WARN
        log::LevelFilter::Warn => log::LevelFilter::Info, // -v -> INFO
        log::LevelFilter::Info => log::LevelFilter::Debug, // -vv -> DEBUG
        log::LevelFilter::Debug => log::LevelFilter::Trace, // -vvv -> TRACE
        log::LevelFilter::Trace => log::LevelFilter::Trace, // -vvvv -> TRACE (max)
    };

    // clap-verbosity-flag doesn't distinguish default from -q on its own,
    // so check the quiet flag directly
    if verbosity.is_silent() {
        log::LevelFilter::Error // -q -> ERROR
    } else {
        adjusted_level
    }
}

fn main() {
    let cli = Cli::parse();

    color_utils::init_color_config(cli.global.no_color);

    // If user didn't pass -v/-q and RUST_LOG is set, honor the env var.
    let use_env = !cli.global.verbosity.is_present() && std::env::var_os("RUST_LOG").is_some();

    let mut logger = if use_env {
        Builder::from_env(Env::default())
    } else {
        let level_filter = get_log_level_from_verbosity(cli.global.verbosity.clone());

        let mut b = Builder::new();
        b.filter_level(level_filter);
        b
    };

    logger
        .format(|buf, record| {
            let level_str = match record.level() {
                Level::Error => "ERROR".red().bold().to_string(),
                Level::Warn => "WARN".yellow().to_string(),
                Level::Info => "INFO".green().to_string(),
                Level::Debug => "DEBUG".blue().to_string(),
                Level::Trace => "TRACE".magenta().to_string(),
            };
            writeln!(buf, "[{}] {}", level_str, record.args())
        })
        .init();

    match &cli.command {
        Some(Commands::Predict(predict_cmd)) => {
            let sources_desc = if predict_cmd.sources.len() == 1 {
                predict_cmd.sources[0].clone()
            } else {
                format!("{} inputs", predict_cmd.sources.len())
            };

            info!(
                "🔍 Prediction: {} | api: {} | display: {}px",
                sources_desc, predict_cmd.api_url, predict_cmd.display_size
            );

            // Build outputs list
            let mut outputs = vec!["report"];
            if predict_cmd.annotate {
                outputs.push("overlays");
            }
            if predict_cmd.json_dump {
                outputs.push("json-dump");
            }
            if cli.global.metadata {
                outputs.push("metadata");
            }
            info!("   Outputs: {}", outputs.join(", "));

            let config = PredictConfig::from_args(cli.global.clone(), predict_cmd.clone());
            match run_batch_prediction(&config) {
                Ok(_) => {}
                Err(e) => {
                    error!("❌ Prediction failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Version) => {
            println!("fender v{}", env!("CARGO_PKG_VERSION"));
            println!("Endpoints: {DAMAGES_ENDPOINT}, {PLATES_ENDPOINT}");
            println!("Transport: up to {MAX_ATTEMPTS} attempts per request");
        }
        None => {
            // Show help if no command specified
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().unwrap();
        }
    }
}
