use clap::Parser;
use std::path::PathBuf;

/// Video feed player core, driven against a simulated engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Media URLs, one feed row each (a built-in sample feed is used when empty)
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Enable logging to file (default: feedplay.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Live sessions kept by the registry (0 = unbounded); overrides settings
    #[arg(long = "capacity", value_name = "N")]
    pub capacity: Option<usize>,

    /// Scroll positions to step through, one row height apart
    #[arg(long = "scroll-steps", value_name = "N", default_value = "4")]
    pub scroll_steps: usize,
}
