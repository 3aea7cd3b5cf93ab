use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pageflow_engine::{DocumentBackend, LopdfBackend, RenderMode, UnavailableOcr};
use pageflow_scheduler::{PipelineConfig, RenderPipeline, RenderRequest, RequestOutcome};
use pageflow_ui::{Clipboard, ClipboardError, FrameReport, MemoryClipboard, Viewer};
use pageflow_viewer_core::ViewerConfig;
use serde::Serialize;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long `simulate` waits for outstanding renders after the last frame
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Parser)]
#[command(name = "pageflow")]
#[command(about = "Smooth-scrolling PDF viewer core, driven from the command line")]
pub struct Cli {
    /// Log more; repeat for more detail. `PAGEFLOW_LOG` sets the level too.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Viewer configuration file (JSON).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page through the render pipeline and write it as PNG.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        /// Render with inverted colours.
        #[arg(long)]
        dark: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Drive the viewer for a number of frames and print what it did.
    Simulate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 60)]
        frames: u32,
        /// Seconds per frame.
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f32,
        /// Vertical scroll impulse applied before the first frame.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        scroll: f32,
        /// Zoom level set before the first frame.
        #[arg(long)]
        zoom_to: Option<f32>,
    },
    /// Select text between two screen points and print it.
    Select {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Start point as `X,Y` in screen pixels.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        from: (f32, f32),
        /// End point as `X,Y` in screen pixels.
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        to: (f32, f32),
        /// Also copy the text to the system clipboard.
        #[arg(long)]
        clipboard: bool,
    },
    /// Print the document's words chunk by chunk as RSVP would show them.
    Rsvp {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        wpm: Option<u32>,
        #[arg(long)]
        chunk: Option<usize>,
        /// Stop after this many chunks.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: usize,
    pages: Vec<PageInfoOutput>,
}

#[derive(Debug, Serialize)]
struct PageInfoOutput {
    page: usize,
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    frames: u32,
    zoom: f32,
    scroll_x: f32,
    scroll_y: f32,
    total_height: f32,
    visible_pages: Vec<usize>,
    scene: SceneOutput,
    totals: TotalsOutput,
    pipeline: PipelineOutput,
    textures: TexturesOutput,
}

#[derive(Debug, Serialize)]
struct SceneOutput {
    pages: usize,
    fresh: usize,
    placeholder: usize,
    blank: usize,
    scrollbar: bool,
    overlay: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct TotalsOutput {
    requested: usize,
    cancelled: usize,
    uploaded: usize,
    discarded: usize,
    failed: usize,
    textures_dropped: usize,
}

impl TotalsOutput {
    fn add(&mut self, report: &FrameReport) {
        self.requested += report.requested;
        self.cancelled += report.cancelled;
        self.uploaded += report.uploaded;
        self.discarded += report.discarded;
        self.failed += report.failed;
        self.textures_dropped += report.textures_dropped;
    }
}

#[derive(Debug, Default, Serialize)]
struct PipelineOutput {
    submitted: u64,
    delivered: u64,
    cancelled: u64,
    failed: u64,
    discarded: u64,
}

#[derive(Debug, Default, Serialize)]
struct TexturesOutput {
    entries: usize,
    bytes: usize,
    hits: u64,
    placeholder_hits: u64,
    misses: u64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Render { file, page, zoom, dark, output } => {
            run_render(&file, page, zoom, dark, output.as_deref())
        }
        Commands::Simulate { file, frames, dt, scroll, zoom_to } => {
            run_simulate(&file, config, frames, dt, scroll, zoom_to)
        }
        Commands::Select { file, from, to, clipboard } => {
            run_select(&file, config, from, to, clipboard)
        }
        Commands::Rsvp { file, wpm, chunk, limit } => run_rsvp(&file, config, wpm, chunk, limit),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => std::env::var("PAGEFLOW_LOG")
            .ok()
            .and_then(|value| LevelFilter::from_str(&value).ok())
            .unwrap_or(LevelFilter::Warn),
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // A logger may already be installed when `run` is called twice in one
    // process.
    let _ = WriteLogger::init(level, Config::default(), std::io::stderr());
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let backend = LopdfBackend::open(file).context("failed to open PDF")?;
    let pages = backend
        .page_sizes()
        .context("failed to read page sizes")?
        .into_iter()
        .enumerate()
        .map(|(index, size)| PageInfoOutput {
            page: index + 1,
            width: size.width,
            height: size.height,
        })
        .collect::<Vec<_>>();

    let payload =
        InfoOutput { path: file.display().to_string(), page_count: backend.page_count(), pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    backend.close();

    Ok(())
}

fn run_render(
    file: &Path,
    page: usize,
    zoom: f32,
    dark: bool,
    output: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let backend: Arc<dyn DocumentBackend> =
        Arc::new(LopdfBackend::open(file).context("failed to open PDF")?);
    let page_count = backend.page_count();
    if page > page_count {
        anyhow::bail!("page {page} out of range (document has {page_count} pages)");
    }

    let mode = if dark { RenderMode::Dark } else { RenderMode::Light };
    let config = PipelineConfig::default().with_workers(1);
    let mut pipeline =
        RenderPipeline::new(backend.clone(), config).context("failed to start render workers")?;

    let page_index = page - 1;
    let outcome = pipeline.request(RenderRequest::new(page_index, zoom, zoom, mode));
    if outcome == RequestOutcome::Rejected {
        anyhow::bail!("invalid render request: page {page} at zoom {zoom}");
    }

    let result = loop {
        if let Some(result) = pipeline.poll_timeout(Duration::from_millis(50)) {
            break result;
        }
        if !pipeline.is_pending(page_index) {
            let context = format!("failed to render page {page}");
            return match pipeline.take_failures().pop() {
                Some(failure) => Err(anyhow::Error::new(failure.error).context(context)),
                None => Err(anyhow::anyhow!(context)),
            };
        }
    };
    pipeline.shutdown();
    backend.close();

    let pixels = result.into_pixels();
    let (width, height) = (pixels.width(), pixels.height());
    let image = image::RgbaImage::from_raw(width, height, pixels.into_raw())
        .context("rendered bitmap has unexpected size")?;

    let output =
        output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(file, page));

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn run_simulate(
    file: &Path,
    config: Option<&Path>,
    frames: u32,
    dt: f32,
    scroll: f32,
    zoom_to: Option<f32>,
) -> Result<()> {
    let mut viewer = open_viewer(file, load_config(config)?, Box::new(MemoryClipboard::new()))?;

    if let Some(zoom) = zoom_to {
        viewer.zoom_to(zoom);
    }
    if scroll != 0.0 {
        viewer.scroll_impulse(0.0, scroll);
    }

    let mut totals = TotalsOutput::default();
    for _ in 0..frames {
        totals.add(&viewer.tick(dt));
    }

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while viewer.pending_renders() > 0 && Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
        totals.add(&viewer.tick(0.0));
    }
    if viewer.pending_renders() > 0 {
        log::warn!("{} renders still outstanding", viewer.pending_renders());
    }

    let scene = viewer.draw();
    let (state, visible_pages) = match viewer.viewport() {
        Some(viewport) => (
            *viewport.state(),
            viewport.visible_pages(0).map(|range| range.collect::<Vec<_>>()).unwrap_or_default(),
        ),
        None => anyhow::bail!("no document loaded"),
    };

    let pipeline = viewer.pipeline_stats().unwrap_or_default();
    let textures = viewer.texture_stats().unwrap_or_default();
    let payload = SimulateOutput {
        frames,
        zoom: state.zoom,
        scroll_x: state.scroll_x,
        scroll_y: state.scroll_y,
        total_height: state.total_height,
        visible_pages,
        scene: SceneOutput {
            pages: scene.pages.len(),
            fresh: scene.fresh_pages(),
            placeholder: scene.placeholder_pages(),
            blank: scene.blank_pages(),
            scrollbar: scene.scrollbar.is_some(),
            overlay: scene.overlay.map(|overlay| overlay.text),
        },
        totals,
        pipeline: PipelineOutput {
            submitted: pipeline.submitted,
            delivered: pipeline.delivered,
            cancelled: pipeline.cancelled,
            failed: pipeline.failed,
            discarded: pipeline.discarded,
        },
        textures: TexturesOutput {
            entries: textures.entries,
            bytes: textures.bytes,
            hits: textures.hits,
            placeholder_hits: textures.placeholder_hits,
            misses: textures.misses,
        },
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_select(
    file: &Path,
    config: Option<&Path>,
    from: (f32, f32),
    to: (f32, f32),
    clipboard: bool,
) -> Result<()> {
    let sink: Box<dyn Clipboard> =
        if clipboard { Box::new(SystemClipboard) } else { Box::new(MemoryClipboard::new()) };
    let mut viewer = open_viewer(file, load_config(config)?, sink)?;

    if !viewer.mouse_down(from.0, from.1) {
        anyhow::bail!("selection must start on a page: ({}, {})", from.0, from.1);
    }
    viewer.mouse_drag(to.0, to.1);
    viewer.mouse_up(to.0, to.1);

    let text = if clipboard {
        viewer.copy_selection().context("failed to copy selection")?.unwrap_or_default()
    } else {
        viewer.selected_text()?
    };
    println!("{text}");

    Ok(())
}

fn run_rsvp(
    file: &Path,
    config: Option<&Path>,
    wpm: Option<u32>,
    chunk: Option<usize>,
    limit: Option<usize>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(wpm) = wpm {
        config.rsvp_wpm = wpm;
    }
    if let Some(chunk) = chunk {
        config.rsvp_chunk_size = chunk;
    }

    let mut viewer = open_viewer(file, config, Box::new(MemoryClipboard::new()))?;
    viewer.toggle_rsvp().context("failed to extract text")?;

    let mut shown = 0;
    while let Some(frame) = viewer.rsvp_frame() {
        if !frame.text.is_empty() {
            println!("{}", frame.text);
            shown += 1;
        }
        if frame.finished || limit.is_some_and(|limit| shown >= limit) {
            break;
        }
        if !viewer.tick(60.0 / frame.wpm as f32).rsvp_advanced {
            break;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    ViewerConfig::load(path).context("failed to load configuration")
}

fn open_viewer(
    file: &Path,
    config: ViewerConfig,
    clipboard: Box<dyn Clipboard>,
) -> Result<Viewer> {
    ensure_pdf_exists(file)?;

    let mut viewer = Viewer::new(config, Arc::new(UnavailableOcr), clipboard)?;
    viewer.open(file).context("failed to open PDF")?;
    Ok(viewer)
}

/// System clipboard through `arboard`. A fresh handle is taken per copy.
struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|err| ClipboardError::Unavailable(err.to_string()))?;
        clipboard.set_text(text).map_err(|err| ClipboardError::Write(err.to_string()))?;
        log::debug!("copied {} bytes to the system clipboard", text.len());
        Ok(())
    }
}

fn parse_point(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = value.split_once(',').ok_or_else(|| format!("expected X,Y, got {value:?}"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f32>()
            .ok()
            .filter(|number| number.is_finite())
            .ok_or_else(|| format!("invalid coordinate {part:?}"))
    };
    Ok((parse(x)?, parse(y)?))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn default_render_output(file: &Path, page: usize) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
