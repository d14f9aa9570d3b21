//! Command-line interface.

use super::app_config::LogLevel;
use crate::domain::entities::{NetworkPolicy, Priority, Request};
use crate::domain::errors::RequestError;
use clap::Parser;
use std::path::PathBuf;

/// Request priority as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PriorityArg {
    /// Background.
    Low,
    /// Regular.
    Normal,
    /// User-visible.
    High,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Self::Low,
            PriorityArg::Normal => Self::Normal,
            PriorityArg::High => Self::High,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "imgrelay",
    version,
    about = "Fetch, decode, transform and cache images",
    long_about = None
)]
/// Command-line arguments.
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Concurrent hunts.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Memory cache budget in MiB.
    #[arg(long, value_name = "MIB")]
    pub cache_mb: Option<usize>,

    /// Retries granted to network loads.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Network timeout in seconds.
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Target size as `WIDTHxHEIGHT`; 0 leaves an axis free.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,

    /// Crop to fill the target size.
    #[arg(long, conflicts_with = "center_inside", requires = "resize")]
    pub center_crop: bool,

    /// Fit inside the target size.
    #[arg(long, requires = "resize")]
    pub center_inside: bool,

    /// Never scale up.
    #[arg(long, requires = "resize")]
    pub only_scale_down: bool,

    /// Clockwise rotation in degrees.
    #[arg(long, value_name = "DEGREES", allow_hyphen_values = true)]
    pub rotate: Option<f32>,

    /// Request priority.
    #[arg(long, value_enum, default_value = "normal")]
    pub priority: PriorityArg,

    /// Never touch the network.
    #[arg(long)]
    pub offline: bool,

    /// Tag attached to every load.
    #[arg(long)]
    pub tag: Option<String>,

    /// Directory to write the decoded PNGs to.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// URIs or file paths to load.
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,
}

impl CliArgs {
    /// Builds the request for one source from the transform flags.
    ///
    /// # Errors
    /// Returns `RequestError` when the flags do not form a valid request.
    pub fn build_request(&self, source: &str) -> Result<Request, RequestError> {
        let mut builder = Request::uri(source).priority(self.priority.into());
        if let Some((width, height)) = self.resize {
            builder = builder.resize(width, height);
        }
        if self.center_crop {
            builder = builder.center_crop();
        }
        if self.center_inside {
            builder = builder.center_inside();
        }
        if self.only_scale_down {
            builder = builder.only_scale_down();
        }
        if let Some(degrees) = self.rotate {
            builder = builder.rotate(degrees);
        }
        if self.offline {
            builder = builder.network_policy(NetworkPolicy::OFFLINE);
        }
        builder.build()
    }
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width = width
        .trim()
        .parse()
        .map_err(|e| format!("bad width `{width}`: {e}"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|e| format!("bad height `{height}`: {e}"))?;
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Fit;
    use test_case::test_case;

    #[test_case("640x480", Some((640, 480)) ; "both axes")]
    #[test_case("0X200", Some((0, 200)) ; "height only")]
    #[test_case("640", None ; "missing separator")]
    #[test_case("axb", None ; "not numbers")]
    fn test_parse_size(input: &str, expected: Option<(u32, u32)>) {
        assert_eq!(parse_size(input).ok(), expected);
    }

    #[test]
    fn test_build_request_from_flags() {
        let args = CliArgs::parse_from([
            "imgrelay",
            "--resize",
            "100x50",
            "--center-crop",
            "--rotate",
            "-90",
            "--priority",
            "high",
            "--offline",
            "https://example.com/a.png",
        ]);

        let request = args.build_request(&args.sources[0]).expect("valid");

        assert_eq!((request.target_width(), request.target_height()), (100, 50));
        assert!(matches!(request.fit(), Fit::CenterCrop(_)));
        assert_eq!(request.priority(), Priority::High);
        assert!(request.network_policy().is_offline_only());
        assert!(request.rotation().is_some());
    }

    #[test]
    fn test_center_crop_requires_resize() {
        let result = CliArgs::try_parse_from(["imgrelay", "--center-crop", "a.png"]);
        assert!(result.is_err());
    }
}
