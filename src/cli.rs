//! Command-line interface definitions for the M&A news extractor.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Flags override values from the optional `config.yaml`; Valor Econômico
//! credentials can also come from the environment.

use crate::config::ExtractorConfig;
use crate::credentials::LayeredCredentials;
use crate::models::Source;
use clap::{Args, Parser, Subcommand};

/// Command-line arguments for the M&A news extractor.
///
/// # Examples
///
/// ```sh
/// # Last 30 days from every source, settings from config.yaml
/// ma_news_extractor run --config config.yaml
///
/// # One week, two pages per source, one source at a time
/// ma_news_extractor run --days 7 --max-pages 2 --sequential
///
/// # Only the open sources
/// ma_news_extractor run --source pipeline-valor --source fusoes-aquisicoes
///
/// # List previous runs
/// ma_news_extractor history --output-dir ./output
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl the sources and write a spreadsheet
    Run(RunArgs),
    /// List previous runs from the history file
    History(HistoryArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Search query sent to each source
    #[arg(short, long)]
    pub query: Option<String>,

    /// How many days back to look
    #[arg(short, long)]
    pub days: Option<u32>,

    /// Result pages to read per source
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Crawl sources one after another instead of concurrently
    #[arg(long)]
    pub sequential: bool,

    /// Directory for spreadsheets and the run history
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Restrict the run to these sources (repeatable)
    #[arg(short, long = "source", value_enum)]
    pub sources: Vec<Source>,

    /// Valor Econômico account e-mail
    #[arg(long, env = "VALOR_EMAIL")]
    pub valor_email: Option<String>,

    /// Valor Econômico account password
    #[arg(long, env = "VALOR_PASSWORD", hide_env_values = true)]
    pub valor_password: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct HistoryArgs {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory holding extraction_history.json
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Show only the most recent N runs
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

impl RunArgs {
    /// Apply flags on top of file settings.
    pub fn apply(&self, config: &mut ExtractorConfig) {
        if let Some(query) = &self.query {
            config.query = query.clone();
        }
        if let Some(days) = self.days {
            config.days = days;
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if self.sequential {
            config.parallel = false;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
    }

    pub fn credentials(&self, config: &ExtractorConfig) -> LayeredCredentials {
        LayeredCredentials {
            valor_email: self.valor_email.clone(),
            valor_password: self.valor_password.clone(),
            file_email: config.credentials.valor_email.clone(),
            file_password: config.credentials.valor_password.clone(),
        }
    }
}
