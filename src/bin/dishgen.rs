//! CLI for dishgen - batch dish image generation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use dishgen::input::{load_tasks, PLACEHOLDER_NAME};
use dishgen::{
    BatchDriver, BatchOptions, BatchReport, BatchState, ClientConfig, FailurePolicy, GeminiModel,
    GenerationTask, RetryPolicy, TaskStatus, TransportKind,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dishgen")]
#[command(about = "Generate top and front view dish images via the Gemini image API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    run: RunArgs,

    /// Output the batch report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate both views for a single prompt
    Prompt {
        /// The text prompt describing the dish
        text: String,
    },

    /// Generate both views for every row of a spreadsheet
    Sheet {
        /// CSV, XLSX, XLS or ODS file with `dishes` and `dish prompt` columns
        path: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Output root directory
    #[arg(short, long, global = true, default_value = "temp_output")]
    output_dir: PathBuf,

    /// Request budget used to space calls
    #[arg(long, global = true, default_value_t = 10)]
    rpm: u32,

    /// Attempts per image, including the first
    #[arg(long, global = true, default_value_t = 5)]
    max_attempts: u32,

    /// Wait after the first failed attempt, in milliseconds
    #[arg(long, global = true, default_value_t = 1000)]
    base_delay_ms: u64,

    /// Upper bound on the backoff wait, in milliseconds
    #[arg(long, global = true, default_value_t = 10_000)]
    max_delay_ms: u64,

    /// Output image width in pixels
    #[arg(long, global = true, default_value_t = 1080)]
    width: u32,

    /// Output image height in pixels
    #[arg(long, global = true, default_value_t = 550)]
    height: u32,

    /// Gemini model
    #[arg(short, long, global = true, value_enum, default_value = "nano-banana")]
    model: ModelArg,

    /// Use the streaming endpoint
    #[arg(long, global = true)]
    stream: bool,

    /// Continue with the next dish when one fails
    #[arg(long, global = true)]
    keep_going: bool,

    /// Do not zip the output directory
    #[arg(long, global = true)]
    no_archive: bool,

    /// Override the API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Flash2Exp,
    NanoBanana,
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Flash2Exp => GeminiModel::Flash2Exp,
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Credentials first: a missing key is fatal before any input is read.
    let client = client_config(&cli.run)?.build_client()?;

    let tasks = match &cli.command {
        Commands::Prompt { text } => vec![GenerationTask::from_prompt(text)?],
        Commands::Sheet { path } => load_tasks(path)?,
    };
    if tasks.is_empty() {
        anyhow::bail!("no dishes to generate");
    }

    let mut driver = BatchDriver::new(client, batch_options(&cli.run))?;
    let report = driver.run(&tasks).await?;

    print_report(&report, cli.json)?;

    if report.state != BatchState::Done {
        anyhow::bail!("generation failed; check the log for details");
    }
    Ok(())
}

fn client_config(args: &RunArgs) -> anyhow::Result<ClientConfig> {
    let retry = RetryPolicy::new(
        args.max_attempts,
        Duration::from_millis(args.base_delay_ms),
        Duration::from_millis(args.max_delay_ms),
    )?;

    let transport = if args.stream {
        TransportKind::GeminiStream
    } else {
        TransportKind::Gemini
    };

    let mut builder = ClientConfig::builder()
        .model(args.model.into())
        .transport(transport)
        .retry(retry);
    if let Some(ref url) = args.base_url {
        builder = builder.base_url(url);
    }
    Ok(builder.build()?)
}

fn batch_options(args: &RunArgs) -> BatchOptions {
    BatchOptions {
        output_dir: args.output_dir.clone(),
        requests_per_minute: args.rpm,
        width: args.width,
        height: args.height,
        failure_policy: if args.keep_going {
            FailurePolicy::SkipFailed
        } else {
            FailurePolicy::FailFast
        },
        archive: !args.no_archive,
    }
}

fn print_report(report: &BatchReport, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for task in &report.tasks {
        let name = if task.name == PLACEHOLDER_NAME {
            "(prompt)"
        } else {
            task.name.as_str()
        };
        match task.status {
            TaskStatus::Completed => {
                println!("✓ {}", name);
                for output in &task.outputs {
                    println!("    {}", output.path.display());
                }
            }
            TaskStatus::Failed => {
                let view = task.failed_view.map(|v| v.to_string()).unwrap_or_default();
                println!(
                    "✗ {} ({} view): {}",
                    name,
                    view,
                    task.error.as_deref().unwrap_or("unknown error")
                );
            }
            TaskStatus::Pending | TaskStatus::InProgress => println!("- {} (not attempted)", name),
        }
    }

    println!(
        "\n{} of {} dishes completed, {} requests",
        report.count(TaskStatus::Completed),
        report.tasks.len(),
        report.requests
    );
    if let Some(ref archive) = report.archive {
        println!("Archive: {}", archive.display());
    }
    Ok(())
}
