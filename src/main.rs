use std::io::Read;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use framecast::config::Config;
use framecast::dispatch::registry::{MediaKind, MediaRequest, Registry};
use framecast::options::{ImageOption, VideoOption};
use framecast::task::GenerationTask;

#[derive(Parser)]
#[command(name = "framecast", about = "Image/video generation and structured-output extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an image from a prompt.
    Image {
        prompt: String,
        /// Size tag such as `1024x1024`.
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        negative: Option<String>,
        #[arg(long)]
        quality: Option<String>,
        #[arg(long)]
        steps: Option<u32>,
        #[arg(long)]
        cfg_scale: Option<f64>,
        #[arg(long)]
        seed: Option<i64>,
        #[arg(long)]
        model: Option<String>,
        /// Reference image URL; repeatable.
        #[arg(long = "reference")]
        references: Vec<String>,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Generate a video clip from a prompt.
    Video {
        prompt: String,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        resolution: Option<String>,
        #[arg(long)]
        first_frame: Option<String>,
        #[arg(long)]
        last_frame: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long = "reference")]
        references: Vec<String>,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Query a previously submitted task once.
    Status { kind: Kind, task_id: String },
    /// Extract the JSON object from model output (file path, or `-` for stdin).
    Extract { input: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Image,
    Video,
}

impl From<Kind> for MediaKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Image => MediaKind::Image,
            Kind::Video => MediaKind::Video,
        }
    }
}

#[derive(clap::Args)]
struct WaitArgs {
    /// Keep polling until the task is terminal.
    #[arg(long)]
    wait: bool,
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
    #[arg(long, default_value_t = 60)]
    max_interval_secs: u64,
    #[arg(long, default_value_t = 120)]
    max_attempts: u32,
}

/// Delay before poll `attempt`: base × 1.5^attempt, capped at `max`.
fn next_poll_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    // Clamp in f64: the raw product overflows Duration on long waits.
    let factor = 1.5_f64.powi(attempt.min(64) as i32);
    let secs = (base.as_secs_f64() * factor).min(max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

async fn wait_for_terminal(
    registry: &Registry,
    kind: MediaKind,
    mut task: GenerationTask,
    args: &WaitArgs,
) -> anyhow::Result<GenerationTask> {
    let Some(task_id) = task.task_id.clone() else {
        return Ok(task);
    };

    let base = Duration::from_secs(args.interval_secs);
    let max = Duration::from_secs(args.max_interval_secs);
    let mut attempt = 0;

    while !task.is_terminal() {
        if attempt >= args.max_attempts {
            anyhow::bail!("task {task_id} still processing after {attempt} polls");
        }
        tokio::time::sleep(next_poll_delay(base, max, attempt)).await;
        attempt += 1;
        task = registry.poll_status(&task_id, kind).await?;
        tracing::debug!(task_id, attempt, state = ?task.state, "polled");
    }
    Ok(task)
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))
    }
}

fn load_dotenv() {
    // Prefer a .env next to the binary, falling back to the CWD search.
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let env_path = dir.join(".env");
        if env_path.exists() {
            dotenvy::from_path(&env_path).ok();
            return;
        }
    }
    dotenvy::dotenv().ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    load_dotenv();

    let cli = Cli::parse();
    let config = Config::load()?;
    let registry = Registry::from_config(&config)?;

    match cli.command {
        Command::Image {
            prompt,
            size,
            negative,
            quality,
            steps,
            cfg_scale,
            seed,
            model,
            references,
            wait,
        } => {
            let mut options = Vec::new();
            options.extend(size.map(ImageOption::Size));
            options.extend(negative.map(ImageOption::NegativePrompt));
            options.extend(quality.map(ImageOption::Quality));
            options.extend(steps.map(ImageOption::Steps));
            options.extend(cfg_scale.map(ImageOption::CfgScale));
            options.extend(seed.map(ImageOption::Seed));
            options.extend(model.map(ImageOption::Model));
            if !references.is_empty() {
                options.push(ImageOption::ReferenceImages(references));
            }

            let mut task = registry.generate(&prompt, &MediaRequest::Image(options)).await?;
            if wait.wait {
                task = wait_for_terminal(&registry, MediaKind::Image, task, &wait).await?;
            }
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Video {
            prompt,
            duration,
            resolution,
            first_frame,
            last_frame,
            model,
            references,
            wait,
        } => {
            let mut options = Vec::new();
            options.extend(duration.map(VideoOption::Duration));
            options.extend(resolution.map(VideoOption::Resolution));
            options.extend(first_frame.map(VideoOption::FirstFrame));
            options.extend(last_frame.map(VideoOption::LastFrame));
            options.extend(model.map(VideoOption::Model));
            if !references.is_empty() {
                options.push(VideoOption::ReferenceImages(references));
            }

            let mut task = registry.generate(&prompt, &MediaRequest::Video(options)).await?;
            if wait.wait {
                task = wait_for_terminal(&registry, MediaKind::Video, task, &wait).await?;
            }
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Status { kind, task_id } => {
            let task = registry.poll_status(&task_id, kind.into()).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Extract { input } => {
            let raw = read_input(&input)?;
            let value: serde_json::Value = registry.extract_structured(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}
