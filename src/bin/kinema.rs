use std::{
    path::{Path, PathBuf},
    time::{Duration, UNIX_EPOCH},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use kinema::{BackendConfig, NodeGraph, NodeId, PixelFormat, Project, RenderBackend, Time};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kinema", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cache every frame of a project's viewer to disk.
    Cache(CacheArgs),
    /// Cache one frame and export it as a PNG.
    Frame(FrameArgs),
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Input project JSON.
    #[arg(long)]
    project: PathBuf,

    /// Backend config JSON. Missing keys keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Override the number of render workers.
    #[arg(long)]
    threads: Option<usize>,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[derive(Parser, Debug)]
struct CacheArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Playhead the cache order is centred on (`secs` or `num/den`).
    #[arg(long, default_value = "0")]
    playhead: Time,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Frame time (`secs` or `num/den`).
    #[arg(long)]
    time: Time,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kinema=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Cache(args) => cmd_cache(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

struct Session {
    graph: NodeGraph,
    viewer: NodeId,
    backend: RenderBackend,
    timeout: Duration,
}

fn open_session(args: &BackendArgs, format: Option<PixelFormat>) -> anyhow::Result<Session> {
    let project = Project::load(&args.project)
        .with_context(|| format!("load project '{}'", args.project.display()))?;
    let (graph, viewer) = project.build().with_context(|| "build node graph")?;

    let mut config = match &args.config {
        Some(path) => BackendConfig::load(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => BackendConfig::default(),
    };
    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if args.threads.is_some() {
        config.worker_count = args.threads;
    }
    if let Some(format) = format {
        config.pixel_format = format;
    }
    config.validate()?;

    let mut backend = RenderBackend::new(config);
    // Same project file contents, same cache namespace.
    backend.set_cache_name_with_stamp(cache_name(&args.project), modified_ms(&args.project)?);
    backend.init().with_context(|| "start render workers")?;
    backend.set_viewer_node(&graph, Some(viewer));

    Ok(Session {
        graph,
        viewer,
        backend,
        timeout: Duration::from_secs(args.timeout),
    })
}

fn cache_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_owned())
}

fn modified_ms(path: &Path) -> anyhow::Result<u64> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("stat project '{}'", path.display()))?;
    let ms = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1);
    Ok(ms.max(1))
}

fn cmd_cache(args: CacheArgs) -> anyhow::Result<()> {
    let mut s = open_session(&args.backend, None)?;
    let length = kinema::nodes::viewer::sequence_length(&s.graph, s.viewer);

    // Only records the playhead; nothing is cached yet.
    let _ = s.backend.request_frame(args.playhead);
    s.backend.invalidate(&s.graph, Time::ZERO, length);
    s.backend.run_until_idle(&s.graph, s.timeout)?;

    let stats = s.backend.stats();
    eprintln!(
        "cached {} frames of '{}' ({} rendered, {} reused, {} skipped, {} failed) in {}",
        s.backend.frame_cache().mapped_times().len(),
        args.backend.project.display(),
        stats.frames_rendered,
        stats.frames_reused,
        stats.frames_skipped,
        stats.frames_failed,
        s.backend.config().cache_dir.display(),
    );
    s.backend.close()?;
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let mut s = open_session(&args.backend, Some(PixelFormat::Rgba8))?;
    let params = *s.backend.params();
    anyhow::ensure!(params.is_valid(), "viewer has no usable render params");
    // The frame showing at `--time` starts on the grid point at or before it.
    let time = args.time.floor_to(params.time_base);
    s.backend.invalidate(&s.graph, time, time);
    s.backend.run_until_idle(&s.graph, s.timeout)?;

    let data = s
        .backend
        .request_frame(time)
        .with_context(|| format!("frame {time} was not cached"))?
        .to_vec();

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &data,
        params.effective_width(),
        params.effective_height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    s.backend.close()?;
    Ok(())
}
