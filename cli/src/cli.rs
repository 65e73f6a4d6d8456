use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use phonepilot_protocol::DisplayMode;

#[derive(Parser, Debug)]
#[command(name = "phonepilot", version)]
pub struct Cli {
    /// Agent backend base URL; overrides the config file.
    #[arg(long = "backend-url", global = true, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Path to an explicit config.toml.
    #[arg(long = "config-file", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Specifies color settings for use in the output.
    #[arg(long = "color", value_enum, default_value_t = Color::Auto, global = true)]
    pub color: Color,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a task on a device and stream the agent's trace to stdout.
    Exec(ExecArgs),
    /// Capture one still frame from a device.
    Screenshot(ScreenshotArgs),
    /// Check that the agent backend is reachable.
    Status,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Device to drive.
    #[arg(long, short = 'd', value_name = "DEVICE_ID")]
    pub device: String,

    /// Use the tool-driven orchestrator instead of the direct model.
    #[arg(long, default_value_t = false)]
    pub orchestrated: bool,

    /// Display transport preference for the device screen.
    #[arg(long = "display", value_enum, default_value_t = DisplayModeArg::Auto)]
    pub display: DisplayModeArg,

    /// Poll the device screen during the task and write frames to this
    /// directory (screenshot transport only).
    #[arg(long = "save-frames", value_name = "DIR")]
    pub save_frames: Option<PathBuf>,

    /// Print updates to stdout as JSONL instead of human output.
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,

    /// Task instruction in natural language.
    pub task: String,
}

#[derive(Args, Debug)]
pub struct ScreenshotArgs {
    /// Device to capture.
    #[arg(long, short = 'd', value_name = "DEVICE_ID")]
    pub device: String,

    /// Output file; defaults to `<device>-screen.png`.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Color {
    Always,
    Never,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DisplayModeArg {
    Auto,
    Video,
    Screenshot,
}

impl From<DisplayModeArg> for DisplayMode {
    fn from(value: DisplayModeArg) -> Self {
        match value {
            DisplayModeArg::Auto => DisplayMode::Auto,
            DisplayModeArg::Video => DisplayMode::Video,
            DisplayModeArg::Screenshot => DisplayMode::Screenshot,
        }
    }
}
