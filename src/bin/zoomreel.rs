use std::io::BufWriter;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use zoomreel::config::{FrameEncoding, PolicyKind, RunConfig, WorkerMode};
use zoomreel::coordinator::client::{DEFAULT_REQUEST_TIMEOUT, HttpCoordinator};
use zoomreel::coordinator::server::{DEFAULT_BIND, serve_forever};
use zoomreel::coordinator::{LocalCoordinator, TransformCoordinator, TransformState};
use zoomreel::{FrameGeometry, FrameIndex, FrameRequest, ShutdownPhase, WorkerExecutor};

/// Exit status when the encoder had to be killed and the output may be incomplete.
const EXIT_FORCE_KILLED: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "zoomreel",
    version,
    about = "Render a Mandelbrot zoom across parallel workers and encode it with ffmpeg",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Command>,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the shared transform center over HTTP.
    Coordinator(CoordinatorArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Process-worker entry point (spawned by the master).
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Number of frames to render (at least 1).
    #[arg(required = true, value_parser = clap::value_parser!(u64).range(1..))]
    frames: Option<u64>,

    /// Run configuration JSON; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output MP4 path.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Number of workers (default: host parallelism).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,

    #[arg(long, value_enum)]
    worker_mode: Option<WorkerMode>,

    /// Worker selection strategy.
    #[arg(long, value_enum)]
    policy: Option<PolicyKind>,

    /// Seed for the random policy.
    #[arg(long)]
    seed: Option<u64>,

    /// External coordinator base URL; without one, process runs host their own.
    #[arg(long)]
    coordinator_url: Option<String>,

    /// Frame payload layout handed to ffmpeg.
    #[arg(long, value_enum)]
    encoding: Option<FrameEncoding>,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    fps: Option<u32>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    max_iterations: Option<u32>,

    /// Fail instead of replacing an existing output file.
    #[arg(long)]
    no_overwrite: bool,
}

#[derive(Args, Debug)]
struct CoordinatorArgs {
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: SocketAddr,
}

#[derive(Args, Debug)]
struct FrameArgs {
    /// Frame index (1-based).
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    index: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Run configuration JSON for the frame geometry.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read the transform center from this coordinator instead of using the origin.
    #[arg(long)]
    coordinator_url: Option<String>,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Frame geometry as JSON.
    #[arg(long)]
    geometry: String,

    #[arg(long)]
    coordinator: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    zoomreel::logging::init();
    match cli.cmd {
        Some(Command::Coordinator(args)) => cmd_coordinator(args),
        Some(Command::Frame(args)) => cmd_frame(args),
        Some(Command::Worker(args)) => cmd_worker(args),
        None => cmd_render(cli.render),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RunConfig> {
    Ok(match path {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    })
}

fn coordinator_for(url: Option<String>) -> anyhow::Result<Arc<dyn TransformCoordinator>> {
    Ok(match url {
        Some(url) => Arc::new(HttpCoordinator::new(url, DEFAULT_REQUEST_TIMEOUT)?),
        None => Arc::new(LocalCoordinator::default()),
    })
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_ref())?;
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if let Some(out) = args.out {
        cfg.out_path = out;
    }
    if let Some(workers) = args.workers {
        cfg.workers = usize::try_from(workers).context("worker count out of range")?;
    }
    if let Some(mode) = args.worker_mode {
        cfg.worker_mode = mode;
    }
    if let Some(policy) = args.policy {
        cfg.policy = policy;
    }
    if let Some(seed) = args.seed {
        cfg.policy_seed = seed;
    }
    if let Some(url) = args.coordinator_url {
        cfg.coordinator_url = Some(url);
    }
    if let Some(encoding) = args.encoding {
        cfg.geometry.encoding = encoding;
    }
    if let Some(fps) = args.fps {
        cfg.fps = fps;
    }
    if let Some(width) = args.width {
        cfg.geometry.width = width;
    }
    if let Some(height) = args.height {
        cfg.geometry.height = height;
    }
    if let Some(max_iterations) = args.max_iterations {
        cfg.geometry.max_iterations = max_iterations;
    }
    if args.no_overwrite {
        cfg.overwrite = false;
    }
    cfg.validate()?;

    let report = zoomreel::render_zoom(&cfg)?;
    for closed in &report.closed_workers {
        eprintln!("warning: {} closed early: {}", closed.worker, closed.reason);
    }
    if report.shutdown.phase == ShutdownPhase::ForceKilled {
        eprintln!(
            "warning: encoder did not finish after {} attempts and was killed; '{}' may be incomplete",
            report.shutdown.attempts,
            cfg.out_path.display()
        );
        std::process::exit(EXIT_FORCE_KILLED);
    }

    eprintln!("wrote {}", cfg.out_path.display());
    Ok(())
}

fn cmd_coordinator(args: CoordinatorArgs) -> anyhow::Result<()> {
    serve_forever(args.bind, TransformState::default())?;
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let geometry = FrameGeometry {
        encoding: FrameEncoding::Png,
        ..cfg.geometry
    };
    geometry.validate()?;

    let executor = WorkerExecutor::new(geometry, coordinator_for(args.coordinator_url)?)
        .with_parallel_rows(true);
    let result = executor.execute(FrameRequest::new(FrameIndex(args.index)))?;

    zoomreel::encode::ensure_parent_dir(&args.out)?;
    std::fs::write(&args.out, &result.payload)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let geometry: FrameGeometry =
        serde_json::from_str(&args.geometry).context("parse --geometry JSON")?;
    geometry.validate()?;
    let executor = WorkerExecutor::new(geometry, coordinator_for(args.coordinator)?);

    let stdin = std::io::stdin().lock();
    let stdout = BufWriter::new(std::io::stdout().lock());
    zoomreel::pool::process::run_worker_loop(stdin, stdout, &executor)?;
    Ok(())
}
