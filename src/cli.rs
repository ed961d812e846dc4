use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "apartment-finder")]
#[command(about = "Determine the effective COM threading model of a class")]
pub struct Cli {
    /// ProgID, or CLSID in registry format including dashes and curly braces
    #[arg(value_name = "PROGID_OR_CLSID")]
    pub target: String,

    /// IID in registry format; needed for marshaler and proxy/stub checks
    #[arg(value_name = "IID")]
    pub iid: Option<String>,

    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// One line per regime instead of the explanatory text
    #[arg(long)]
    pub brief: bool,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Resolve against a JSON fixture instead of the live system
    #[arg(long, value_name = "FILE")]
    pub fixture: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
