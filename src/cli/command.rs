use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use h264au::process::session::{
    DEFAULT_HARDWARE_STALL_THRESHOLD, DEFAULT_SOFTWARE_STALL_THRESHOLD,
};

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        "\nh264au ", env!("H264AU_VERSION"),
        "\nbuilt ", env!("BUILD_TIMESTAMP"),
    ),
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting, reframing and decoding H.264 Annex-B streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode the specified stream into raw planar YUV 4:2:0.
    Decode(DecodeArgs),

    /// Print stream information
    Info(InfoArgs),

    /// Rewrite the stream as gated, one-picture-per-unit Annex-B.
    Reframe(ReframeArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input H.264 Annex-B bitstream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for raw YUV frames (use "-" for stdout).
    #[arg(long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long, value_name = "COUNT")]
    pub max_frames: Option<u64>,

    /// Access units a hardware decoder may consume without output before
    /// falling back to software.
    #[arg(long, value_name = "UNITS", default_value_t = DEFAULT_HARDWARE_STALL_THRESHOLD)]
    pub hardware_stall_threshold: u32,

    /// Access units the software decoder may consume without output.
    #[arg(long, value_name = "UNITS", default_value_t = DEFAULT_SOFTWARE_STALL_THRESHOLD)]
    pub software_stall_threshold: u32,

    /// Read size used to emulate demultiplexer packets.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub chunk_size: usize,

    /// Disable progress estimation
    #[arg(long)]
    pub no_estimate_progress: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input H.264 Annex-B bitstream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Print the report as YAML.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Args)]
pub struct ReframeArgs {
    /// Input H.264 Annex-B bitstream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path (use "-" for stdout).
    #[arg(long, value_name = "PATH")]
    pub output_path: PathBuf,

    /// Write every assembled access unit, including those before the first IDR.
    #[arg(long)]
    pub no_gate: bool,

    /// Read size used to emulate demultiplexer packets.
    #[arg(long, value_name = "BYTES", default_value_t = 64 * 1024)]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

impl Cli {
    /// Level at which the library components turn diagnostics into errors.
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}
