use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use headcast::{
    ArtifactAssembler, AudioTrack, BackendKind, Coefficients, DrivingSequence, FfmpegAssembler,
    FfmpegAssemblerOpts, JobOutput, ObserverError, PixelGrid, PngSequenceAssembler, SourcePortrait,
    StreamConfig, StreamSession, create_backend, observer_fn,
};
use tracing_subscriber::EnvFilter;

/// Coefficient width of generated driving sequences.
const DEFAULT_CHANNELS: usize = 70;
/// Side of the generated portrait.
const DEFAULT_PORTRAIT_SIZE: u32 = 256;

#[derive(Parser, Debug)]
#[command(name = "headcast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a rendering job, logging progress live, and assemble the result.
    Render(RenderArgs),
    /// Dump idle nodding frames as PNGs.
    Nod(NodArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Source portrait image. A generated gradient portrait is used when omitted.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Source semantic coefficients (JSON array). Zeros when omitted.
    #[arg(long)]
    semantics: Option<PathBuf>,

    /// Pipeline configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render previews at this square size instead of full resolution.
    #[arg(long)]
    preview_size: Option<u32>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Driving coefficients JSON. A generated sequence is used when omitted.
    #[arg(long)]
    coeffs: Option<PathBuf>,

    /// Frame count of the generated sequence.
    #[arg(long, default_value_t = 50)]
    frames: usize,

    /// Output MP4 path, or output directory with `--png`.
    #[arg(long)]
    out: PathBuf,

    /// Write numbered PNG files instead of an MP4.
    #[arg(long, default_value_t = false)]
    png: bool,

    /// Audio file muxed into the MP4.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Do not emit idle frames while the first frame renders.
    #[arg(long, default_value_t = false)]
    no_idle: bool,
}

#[derive(Parser, Debug)]
struct NodArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Number of filler frames.
    #[arg(long, default_value_t = 25)]
    frames: u32,

    /// Clock step between frames, in seconds. Defaults to one frame at the configured fps.
    #[arg(long)]
    step: Option<f64>,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    initialise_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Nod(args) => cmd_nod(args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let config = load_config(&args.source)?;
    let driving = match &args.coeffs {
        Some(path) => DrivingSequence::from_path(path)?,
        None => generated_sequence(args.frames, DEFAULT_CHANNELS)?,
    };
    let session = StreamSession::new(create_backend(BackendKind::Synthetic), &config)?;
    let source = load_source(&session, &args.source, driving.width())?;

    session.register(observer_fn("progress-log", |frame| {
        if frame.is_filler() {
            tracing::debug!("nodding");
        } else {
            tracing::info!(
                frame = frame.frame_index(),
                total = frame.total_frames().unwrap_or_default(),
                progress = format!("{:.1}%", frame.progress() * 100.0),
                "frame"
            );
        }
        Ok::<(), ObserverError>(())
    }))?;

    let mut assembler: Box<dyn ArtifactAssembler> = if args.png {
        Box::new(PngSequenceAssembler::new(&args.out))
    } else {
        let mut opts = FfmpegAssemblerOpts::new(&args.out);
        opts.overwrite = config.overwrite;
        opts.fps = config.fps;
        Box::new(FfmpegAssembler::new(opts))
    };
    let audio = args.audio.map(AudioTrack::File);
    let output = JobOutput::new(assembler.as_mut()).with_audio(audio.as_ref());

    let res = if args.no_idle {
        session.run(&source, &driving, output)
    } else {
        session.run_with_idle(&source, &driving, output)
    };
    let reports = session.close();
    for report in &reports {
        tracing::debug!(
            observer = %report.name,
            delivered = report.delivered,
            dropped = report.dropped,
            "observer report"
        );
    }
    let state = session.snapshot();
    tracing::info!(status = %state.status, "job finished");

    let artifact = res?;
    println!("{}", artifact.display());
    Ok(())
}

fn cmd_nod(args: NodArgs) -> anyhow::Result<()> {
    let config = load_config(&args.source)?;
    let session = StreamSession::new(create_backend(BackendKind::Synthetic), &config)?;
    let source = load_source(&session, &args.source, DEFAULT_CHANNELS)?;

    let step = args.step.unwrap_or_else(|| config.fps.frame_duration_secs());
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create output dir '{}'", args.out.display()))?;
    for i in 0..args.frames {
        let clock = f64::from(i) * step;
        let frame = session.filler().filler_frame(&source, clock)?;
        let image = frame.image();
        let path = args.out.join(format!("nod_{i:05}.png"));
        image::save_buffer_with_format(
            &path,
            &image.to_rgb8(),
            image.width(),
            image.height(),
            image::ColorType::Rgb8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
    }
    tracing::info!(frames = args.frames, dir = %args.out.display(), "wrote nod frames");
    Ok(())
}

fn load_config(args: &SourceArgs) -> anyhow::Result<StreamConfig> {
    let mut config = match &args.config {
        Some(path) => StreamConfig::from_path(path)?,
        None => StreamConfig::default(),
    };
    if args.preview_size.is_some() {
        config.producer.preview_size = args.preview_size;
    }
    config.validate()?;
    Ok(config)
}

fn load_source(
    session: &StreamSession,
    args: &SourceArgs,
    channels: usize,
) -> anyhow::Result<SourcePortrait> {
    let image = match &args.image {
        Some(path) => PixelGrid::from_image_path(path)?,
        None => generated_portrait(DEFAULT_PORTRAIT_SIZE)?,
    };
    let semantics = match &args.semantics {
        Some(path) => read_semantics(path)?,
        None => Coefficients::new(vec![0.0; channels])?,
    };
    Ok(session.prepare_source(image, semantics)?)
}

fn read_semantics(path: &Path) -> anyhow::Result<Coefficients> {
    let f = std::fs::File::open(path)
        .with_context(|| format!("open semantics '{}'", path.display()))?;
    let values: Vec<f32> = serde_json::from_reader(std::io::BufReader::new(f))
        .with_context(|| format!("parse semantics '{}'", path.display()))?;
    Ok(Coefficients::new(values)?)
}

fn generated_portrait(size: u32) -> anyhow::Result<PixelGrid> {
    let mut data = Vec::with_capacity((size as usize) * (size as usize) * 3);
    let c = (size as f32 - 1.0) / 2.0;
    for y in 0..size {
        for x in 0..size {
            let dx = (x as f32 - c) / c;
            let dy = (y as f32 - c) / c;
            let face = (1.0 - (dx * dx + dy * dy * 0.8)).clamp(0.0, 1.0);
            data.extend_from_slice(&[
                0.2 + 0.7 * face,
                0.2 + 0.5 * face,
                0.3 + 0.4 * face,
            ]);
        }
    }
    Ok(PixelGrid::new(size, size, data)?)
}

fn generated_sequence(frames: usize, channels: usize) -> anyhow::Result<DrivingSequence> {
    let rows = (0..frames)
        .map(|i| {
            let t = i as f32 / 25.0;
            let values = (0..channels)
                .map(|c| 0.2 * (t * 3.0 + c as f32 * 0.7).sin())
                .collect();
            Coefficients::new(values)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DrivingSequence::new(rows)?)
}
