//! CLI commands implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use nonnative::{load_settings, FormInput, OutputSink, Settings};

#[derive(Parser)]
#[command(name = "nonnative")]
#[command(about = "Non-native species documented in bordering states but not in the state itself")]
#[command(version)]
pub struct Cli {
    /// Config file (default: discovered nonnative.{toml,yaml,json})
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Occurrence API endpoint
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch both lists and render the species missing from the state
    Report {
        #[command(flatten)]
        input: InputArgs,
        /// Reference table mapping species names to descriptions
        #[arg(short, long)]
        reference: Option<PathBuf>,
        /// Write a standalone HTML page
        #[arg(short, long, conflicts_with = "patch")]
        output: Option<PathBuf>,
        /// Replace the target element's content inside an existing HTML page
        #[arg(long)]
        patch: Option<PathBuf>,
        /// Id of the element receiving the list
        #[arg(long)]
        element_id: Option<String>,
        /// HTML-escape species names and descriptions
        #[arg(long)]
        escape: bool,
        /// Print a JSON summary instead of HTML
        #[arg(long, conflicts_with_all = ["output", "patch"])]
        json: bool,
    },

    /// Print the two query URLs without fetching
    Query {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Show effective configuration
    Config,
}

#[derive(clap::Args)]
struct InputArgs {
    /// Combined code: state prefix (2 chars) followed by region suffix
    #[arg(short, long, env = "NONNATIVE_CODE")]
    code: String,
    /// Group identifier appended to each code
    #[arg(short, long, env = "NONNATIVE_GROUP")]
    group: String,
}

impl InputArgs {
    fn to_input(&self) -> FormInput {
        FormInput::new(self.code.trim(), self.group.trim())
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut settings, _config) = load_settings(cli.config.as_deref()).await?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(timeout) = cli.timeout {
        settings.request_timeout = timeout;
    }

    match cli.command {
        Commands::Report {
            input,
            reference,
            output,
            patch,
            element_id,
            escape,
            json,
        } => {
            if let Some(reference) = reference {
                settings.reference_table = Some(reference);
            }
            if let Some(element_id) = element_id {
                settings.element_id = element_id;
            }
            settings.escape_names |= escape;

            let sink = match (output, patch) {
                (Some(path), _) => OutputSink::Page(path),
                (None, Some(path)) => OutputSink::Patch(path),
                (None, None) => OutputSink::Stdout,
            };
            cmd_report(&settings, &input.to_input(), sink, json).await
        }
        Commands::Query { input } => cmd_query(&settings, &input.to_input()),
        Commands::Config => cmd_config(&settings),
    }
}

async fn cmd_report(
    settings: &Settings,
    input: &FormInput,
    sink: OutputSink,
    json: bool,
) -> anyhow::Result<()> {
    let pipeline = settings
        .build_pipeline()
        .await
        .context("Failed to set up report")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(format!(
        "Comparing {} against {}...",
        input.region_code(),
        input.state_code()
    ));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = pipeline.run(input).await;
    pb.finish_and_clear();

    let report = result.with_context(|| {
        format!(
            "Report failed for code {} group {}",
            input.code, input.group
        )
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
        return Ok(());
    }

    sink.write(&settings.element_id, "Non-native species", report.html())
        .await?;

    if sink != OutputSink::Stdout {
        eprintln!(
            "{} {} species in {} not documented in {}",
            style("✓").green(),
            style(report.count()).bold(),
            style(&report.region_query.fips).cyan(),
            style(&report.state_query.fips).cyan()
        );
    }
    Ok(())
}

fn cmd_query(settings: &Settings, input: &FormInput) -> anyhow::Result<()> {
    input.validate()?;
    let template = settings.query_template()?;

    let region = template.region_query(input);
    let state = template.state_query(input);
    println!("{} {}", style("region").cyan(), region.url);
    println!("{} {}", style("state ").cyan(), state.url);
    Ok(())
}

fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    println!("{}", rendered);
    Ok(())
}
