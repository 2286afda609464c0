use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use lipwave::{
    BlinkConfig, FfmpegSink, FfmpegSinkOpts, Fps, FrameIndex, MappingTable, RenderAssets,
    RenderConfig, RenderThreading, Timeline, load_image,
    recognizer::{ensure_rhubarb_input, probe_duration, run_rhubarb},
    schedule_blinks,
};

#[derive(Parser, Debug)]
#[command(name = "lipwave", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the full lip-sync video (requires `rhubarb` and `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Mouth-shape mapping table (label,image-path rows).
    #[arg(long)]
    lipsync: PathBuf,

    /// Optional blink mapping table (labels A=open, B=half, C=closed).
    #[arg(long)]
    blink: Option<PathBuf>,

    /// Speech audio file to lip-sync against.
    #[arg(long)]
    audio: PathBuf,

    /// Optional background image under all overlays.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Output frame rate.
    #[arg(long, default_value_t = 24)]
    fps: u32,

    /// Blink jitter seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Average seconds between blinks.
    #[arg(long, default_value_t = 3.0)]
    blink_interval: f64,

    /// Bounded jitter around each blink, in seconds.
    #[arg(long, default_value_t = 1.0)]
    blink_jitter: f64,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Overwrite output if it already exists.
    #[arg(long, default_value_t = true)]
    overwrite: bool,

    /// Enable frame-level parallelism.
    #[arg(long, default_value_t = false)]
    parallel: bool,

    /// Override rayon worker threads (parallel mode only).
    #[arg(long)]
    threads: Option<usize>,

    /// Render chunk size in frames.
    #[arg(long, default_value_t = 64)]
    chunk_size: usize,

    /// Render identical-state frames once per chunk.
    #[arg(long, default_value_t = false)]
    static_frame_elision: bool,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Frame index (0-based).
    #[arg(long)]
    frame: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn build_render(input: &InputArgs) -> anyhow::Result<(RenderConfig, RenderAssets)> {
    let fps = Fps::new(input.fps, 1)?;

    let mouth = MappingTable::load(&input.lipsync)?;
    let blink_table = input
        .blink
        .as_deref()
        .map(MappingTable::load)
        .transpose()?;
    let background = input
        .background
        .as_deref()
        .map(load_image)
        .transpose()?;
    let assets = RenderAssets::prepare(mouth, blink_table, background)?;

    let rhubarb_input = ensure_rhubarb_input(&input.audio)?;
    let segments = run_rhubarb(&rhubarb_input)?;
    let duration = probe_duration(&input.audio)?;
    let lip_timeline =
        Timeline::from_segments(segments, Some(duration), fps.frame_duration_secs())?;

    let blink_timeline = if assets.blink.is_some() {
        let cfg = BlinkConfig {
            mean_interval: input.blink_interval,
            jitter: input.blink_jitter,
            seed: input.seed,
            ..BlinkConfig::default()
        };
        Some(schedule_blinks(duration, &cfg)?)
    } else {
        None
    };

    let config = RenderConfig {
        fps,
        duration,
        lip_timeline,
        blink_timeline,
    };
    config.validate(&assets)?;
    Ok((config, assets))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let (config, assets) = build_render(&args.input)?;

    let threading = RenderThreading {
        parallel: args.parallel,
        chunk_size: args.chunk_size,
        threads: args.threads,
        static_frame_elision: args.static_frame_elision,
    };
    let mut sink = FfmpegSink::new(FfmpegSinkOpts {
        out_path: args.out.clone(),
        overwrite: args.overwrite,
        bg_rgba: [0, 0, 0, 255],
        audio: Some(args.input.audio.clone()),
    });

    let stats = lipwave::render_to_sink(&config, &assets, &threading, &mut sink)?;

    eprintln!(
        "wrote {} ({} frames, {} rendered, {} elided)",
        args.out.display(),
        stats.frames_total,
        stats.frames_rendered,
        stats.frames_elided
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let (config, assets) = build_render(&args.input)?;

    let frame = lipwave::render_frame(&config, &assets, FrameIndex(args.frame))?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
