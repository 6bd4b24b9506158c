use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "camflow", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push one image through the engine and write the presented frame as a PNG.
    Frame(FrameArgs),
    /// Run the render loop for a number of frames and print engine stats as JSON.
    Loop(LoopArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Input image standing in for a camera buffer.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Asset root the LUT path is resolved against.
    #[arg(long, default_value = ".")]
    assets: PathBuf,

    /// Engine options JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// LUT asset path (overrides the config).
    #[arg(long)]
    lut: Option<String>,

    #[arg(long, value_enum, default_value_t = ModeChoice::Passthrough)]
    mode: ModeChoice,

    /// Sensor orientation in degrees (0, 90, 180, 270).
    #[arg(long, default_value_t = 0)]
    orientation: i32,

    /// Mirror horizontally (front camera).
    #[arg(long)]
    mirror: bool,

    /// Target width; defaults to the oriented input width.
    #[arg(long)]
    width: Option<u32>,

    /// Target height; defaults to the oriented input height.
    #[arg(long)]
    height: Option<u32>,

    #[arg(long, value_enum, default_value_t = BackendChoice::Cpu)]
    backend: BackendChoice,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Also write the NV21 planes (in `planar-yuv` mode).
    #[arg(long)]
    planar_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LoopArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Frames to present before stopping.
    #[arg(long, default_value_t = 30)]
    frames: u64,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_s: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Passthrough,
    PlanarYuv,
    LutGrade,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Cpu,
    Gpu,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Frame(args) => cmd_frame(args),
        Command::Loop(args) => cmd_loop(args),
    }
}

struct Session {
    engine: camflow::Engine,
    surface: camflow::InMemorySurface,
}

fn read_opts(path: Option<&Path>) -> anyhow::Result<camflow::EngineOpts> {
    let Some(path) = path else {
        return Ok(camflow::EngineOpts::default());
    };
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    Ok(camflow::EngineOpts::from_reader(BufReader::new(f))?)
}

fn start_session(args: &SourceArgs) -> anyhow::Result<Session> {
    let mut opts = read_opts(args.config.as_deref())?;
    if let Some(lut) = &args.lut {
        opts.lut_asset = lut.clone();
    }
    opts.backend = match args.backend {
        BackendChoice::Cpu => camflow::BackendKind::Cpu,
        BackendChoice::Gpu => camflow::BackendKind::Gpu,
    };

    let img = image::open(&args.in_path)
        .with_context(|| format!("open input '{}'", args.in_path.display()))?
        .to_rgba8();
    let buffer = camflow::CpuBuffer::from_image(&img)?;

    let mut orientation = camflow::Orientation::from_degrees(args.orientation)?;
    if args.mirror {
        orientation = orientation.mirrored();
    }
    let input = camflow::Extent::new(img.width(), img.height());
    let oriented = if orientation.rotation.swaps_axes() {
        input.transposed()
    } else {
        input
    };
    let extent = camflow::Extent::new(
        args.width.unwrap_or(oriented.width),
        args.height.unwrap_or(oriented.height),
    );

    let assets = camflow::DirAssets::new(&args.assets);
    let engine = camflow::Engine::create(&assets, opts)?;
    engine.configure(match args.mode {
        ModeChoice::Passthrough => camflow::EngineMode::CameraBufferPassthrough,
        ModeChoice::PlanarYuv => camflow::EngineMode::BufferToPlanarYuv,
        ModeChoice::LutGrade => camflow::EngineMode::LookupTableGrade,
    })?;
    engine.submit_frame(&buffer, orientation)?;

    let surface = camflow::InMemorySurface::new(extent);
    engine.bind_surface(Some(surface.boxed()), extent)?;
    Ok(Session { engine, surface })
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let Session { engine, surface } = start_session(&args.source)?;
    let report = engine.render_once()?;
    let frame = surface
        .last_frame()
        .context("render produced no presented frame")?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    frame
        .to_image()?
        .save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!("wrote {} ({})", args.out.display(), frame.extent());

    if let Some(path) = &args.planar_out {
        let planar = engine
            .latest_planar()
            .context("no planar output; use --mode planar-yuv")?;
        std::fs::write(path, planar.to_nv21_bytes())
            .with_context(|| format!("write nv21 '{}'", path.display()))?;
        eprintln!("wrote {} ({})", path.display(), planar.extent());
    }

    tracing::debug!(?report, "frame rendered");
    engine.destroy()?;
    Ok(())
}

fn cmd_loop(args: LoopArgs) -> anyhow::Result<()> {
    let Session { engine, surface } = start_session(&args.source)?;
    let deadline = Instant::now() + Duration::from_secs(args.timeout_s);

    engine.start_loop()?;
    while surface.frames_presented() < args.frames {
        if let Some(err) = engine.fatal_error() {
            return Err(err.into());
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "timed out after {} of {} frames",
                surface.frames_presented(),
                args.frames
            );
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    engine.stop_loop()?;

    let stats = engine.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    engine.destroy()?;
    Ok(())
}
