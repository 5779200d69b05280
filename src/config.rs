//! Configuration layer providing clean separation between CLI arguments and
//! the internal pipeline configuration.
//!
//! - `GlobalArgs`: options shared by all commands
//! - `PredictCommand`: the CLI surface of the predict command
//! - `PredictConfig` (embedding `BaseConfig`): what the pipeline actually
//!   consumes, converted via `from_args`

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use serde::Serialize;

use crate::upload::CarInfo;

/// The one deployment-specific setting: where the inspection API lives.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/";

/// Parse the overlay canvas side length (bounded to something drawable)
pub fn parse_display_size(s: &str) -> Result<u32, String> {
    let val = s
        .parse::<u32>()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !(16..=4096).contains(&val) {
        return Err(format!("Must be between 16 and 4096, got {val}"));
    }
    Ok(val)
}

/// Global CLI arguments that apply to all fender commands
#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Global output directory (overrides default placement next to input)
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Create a metadata sidecar file per processed image
    #[arg(long, global = true)]
    pub metadata: bool,

    /// Verbosity level (-q/--quiet, -v/-vv/-vvv/-vvvv for info/debug/trace)
    #[command(flatten)]
    pub verbosity: Verbosity,

    /// Warn instead of erroring on unsupported or missing input files
    #[arg(long, global = true)]
    pub permissive: bool,

    /// Disable colored output (also respects NO_COLOR and FENDER_NO_COLOR env vars)
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// CLI command for batch prediction (only command-specific arguments)
#[derive(Parser, Debug, Clone)]
pub struct PredictCommand {
    /// Path(s) to input images or directories. Supports glob patterns like *.jpg
    #[arg(value_name = "IMAGES_OR_DIRS", required = true)]
    pub sources: Vec<String>,

    /// Base URL of the inspection API
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Save an overlay image with detection boxes drawn
    #[arg(long)]
    pub annotate: bool,

    /// Side length in pixels of the square overlay canvas
    #[arg(long, default_value = "600", value_parser = parse_display_size)]
    pub display_size: u32,

    /// Save the raw endpoint responses to predictions.json
    #[arg(long)]
    pub json_dump: bool,

    /// Vehicle make, forwarded to the damages endpoint
    #[arg(long)]
    pub trade: Option<String>,

    /// Vehicle model, forwarded to the damages endpoint
    #[arg(long)]
    pub model: Option<String>,

    /// Vehicle year, forwarded to the damages endpoint
    #[arg(long)]
    pub year: Option<String>,
}

/// Base configuration common to all commands
#[derive(Debug, Clone, Serialize)]
pub struct BaseConfig {
    /// Input sources (images or directories)
    pub sources: Vec<String>,
    /// Optional output directory override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Whether to skip metadata generation
    pub skip_metadata: bool,
    /// Fail on unsupported/missing files. Opposite of `--permissive`.
    pub strict: bool,
}

/// Internal configuration for the prediction pipeline
#[derive(Debug, Clone, Serialize)]
pub struct PredictConfig {
    #[serde(skip)]
    pub base: BaseConfig,
    pub api_url: String,
    pub annotate: bool,
    pub display_size: u32,
    pub json_dump: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

impl From<GlobalArgs> for BaseConfig {
    fn from(global: GlobalArgs) -> Self {
        Self {
            sources: Vec::new(), // Sources come from command, not global args
            output_dir: global.output_dir,
            skip_metadata: !global.metadata, // CLI uses metadata flag, internal uses skip_metadata
            strict: !global.permissive,      // CLI uses permissive, internal uses strict
        }
    }
}

impl PredictConfig {
    /// Create configuration from global args and command-specific args
    pub fn from_args(global: GlobalArgs, cmd: PredictCommand) -> Self {
        let mut base: BaseConfig = global.into();
        base.sources = cmd.sources; // Add sources from command

        Self {
            base,
            api_url: cmd.api_url,
            annotate: cmd.annotate,
            display_size: cmd.display_size,
            json_dump: cmd.json_dump,
            trade: cmd.trade,
            model: cmd.model,
            year: cmd.year,
        }
    }

    /// The customer-car fields as one value, or None when none were given
    pub fn car_info(&self) -> Option<CarInfo> {
        if self.trade.is_none() && self.model.is_none() && self.year.is_none() {
            return None;
        }
        Some(CarInfo {
            trade: self.trade.clone(),
            model: self.model.clone(),
            year: self.year.clone(),
        })
    }
}
