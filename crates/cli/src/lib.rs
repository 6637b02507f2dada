use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use quadcache::tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Stroke};
use quadcache::{CacheParams, CacheStats, Canvas, QuadTreeCache, Rect, RenderError, UncachePolicy};
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Largest viewport side, in pixels, the CLI will allocate
const MAX_VIEWPORT_SIDE: f64 = 16_384.0;

/// Checkerboard cells per page side
const GRID: u32 = 8;

#[derive(Debug, Parser)]
#[command(name = "quadcache")]
#[command(about = "Quad-tree render cache CLI")]
pub struct Cli {
    /// Log cache activity to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay viewport requests against a synthetic page and print JSON.
    Simulate {
        #[command(flatten)]
        cache: CacheArgs,
        /// Viewport as x,y,w,h@zoom in page units.
        #[arg(long = "view", value_name = "X,Y,W,H@ZOOM", required = true)]
        views: Vec<View>,
        /// Replay the whole sequence this many times.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Render one viewport of the synthetic page to a PNG.
    Render {
        #[command(flatten)]
        cache: CacheArgs,
        #[arg(long = "view", value_name = "X,Y,W,H@ZOOM")]
        view: View,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct CacheArgs {
    #[arg(long, default_value_t = 612.0)]
    page_width: f64,
    #[arg(long, default_value_t = 792.0)]
    page_height: f64,
    /// TOML file with cache parameters (defaults come from QUADCACHE_* env vars).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long)]
    entry_size: Option<usize>,
    #[arg(long)]
    max_zoom: Option<f64>,
    #[arg(long)]
    max_size: Option<usize>,
    /// Eviction policy: viewport_then_lru or lru.
    #[arg(long)]
    policy: Option<UncachePolicy>,
    /// Outline painted and subdivided regions.
    #[arg(long)]
    debug_overlay: bool,
}

impl CacheArgs {
    fn page_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.page_width, self.page_height)
    }

    fn params(&self) -> Result<CacheParams> {
        let mut params = match &self.config {
            Some(path) => CacheParams::from_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => CacheParams::from_env().context("invalid QUADCACHE_* environment")?,
        };

        if let Some(entry_size) = self.entry_size {
            params = params.with_entry_size(entry_size);
        }
        if let Some(max_zoom) = self.max_zoom {
            params = params.with_max_zoom(max_zoom);
        }
        if let Some(max_size) = self.max_size {
            params = params.with_max_size(max_size);
        }
        if let Some(policy) = self.policy {
            params = params.with_uncache_policy(policy);
        }
        if self.debug_overlay {
            params = params.with_debug_overlay(true);
        }

        params.validate()?;
        Ok(params)
    }

    fn build_cache(&self) -> Result<QuadTreeCache> {
        let page = self.page_rect();
        let params = self.params()?;

        QuadTreeCache::new(
            move |canvas: &mut Canvas<'_>, region: Rect| -> Result<(), RenderError> {
                paint_page(canvas, page, region);
                Ok(())
            },
            page,
            params,
        )
        .context("failed to create cache")
    }
}

/// A source region and the scale it is displayed at
#[derive(Debug, Clone, Copy, PartialEq)]
struct View {
    src: Rect,
    zoom: f64,
}

impl View {
    fn dst(&self) -> Rect {
        Rect::new(0.0, 0.0, self.src.width * self.zoom, self.src.height * self.zoom)
    }

    fn target(&self) -> Result<Pixmap> {
        let dst = self.dst();
        if dst.width > MAX_VIEWPORT_SIDE || dst.height > MAX_VIEWPORT_SIDE {
            anyhow::bail!("viewport {self} is larger than {MAX_VIEWPORT_SIDE} pixels");
        }

        let width = dst.width.ceil().max(1.0) as u32;
        let height = dst.height.ceil().max(1.0) as u32;
        Pixmap::new(width, height)
            .with_context(|| format!("failed to allocate {width}x{height} viewport"))
    }
}

impl FromStr for View {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (rect, zoom) = match s.split_once('@') {
            Some((rect, zoom)) => (rect, Some(zoom)),
            None => (s, None),
        };

        let parts = rect
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid view '{s}'"))?;
        let &[x, y, width, height] = parts.as_slice() else {
            anyhow::bail!("invalid view '{s}': expected x,y,w,h");
        };

        let zoom = match zoom {
            Some(zoom) => zoom
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid view '{s}': bad zoom"))?,
            None => 1.0,
        };

        if !(zoom.is_finite() && zoom > 0.0) {
            anyhow::bail!("invalid view '{s}': zoom must be positive");
        }

        Ok(Self {
            src: Rect::new(x, y, width, height),
            zoom,
        })
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}@{}",
            self.src.x, self.src.y, self.src.width, self.src.height, self.zoom
        )
    }
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    page: Rect,
    params: CacheParams,
    steps: Vec<StepOutput>,
    stats: CacheStats,
    hit_rate: f64,
}

#[derive(Debug, Serialize)]
struct StepOutput {
    pass: u32,
    view: String,
    render_calls: u64,
    cache_size: usize,
    node_count: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate { cache, views, repeat } => run_simulate(&cache, &views, repeat),
        Commands::Render { cache, view, output } => run_render(&cache, view, &output),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed when run() is called repeatedly
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_simulate(args: &CacheArgs, views: &[View], repeat: u32) -> Result<()> {
    let cache = args.build_cache()?;
    let mut steps = Vec::with_capacity(views.len() * repeat as usize);

    for pass in 1..=repeat {
        for view in views {
            let before = cache.stats().render_calls;
            draw_view(&cache, view)?;

            let step = StepOutput {
                pass,
                view: view.to_string(),
                render_calls: cache.stats().render_calls - before,
                cache_size: cache.cache_size(),
                node_count: cache.node_count(),
            };
            debug!(pass, view = %view, render_calls = step.render_calls, "replayed view");
            steps.push(step);
        }
    }

    let stats = cache.stats();
    let payload = SimulateOutput {
        page: cache.page_rect(),
        params: cache.params(),
        steps,
        stats,
        hit_rate: stats.hit_rate(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_render(args: &CacheArgs, view: View, output: &Path) -> Result<()> {
    let cache = args.build_cache()?;
    let pixmap = draw_view(&cache, &view)?;

    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    let image = image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), rgba)
        .context("viewport buffer has the wrong size")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

/// Render `view` through the cache onto a fresh white viewport
fn draw_view(cache: &QuadTreeCache, view: &View) -> Result<Pixmap> {
    let mut pixmap = view.target()?;
    let mut canvas = Canvas::from_pixmap(&mut pixmap);
    canvas.clear(Color::WHITE);

    cache
        .render(&mut canvas, view.src, view.dst())
        .with_context(|| format!("failed to render view {view}"))?;

    Ok(pixmap)
}

/// Paint the synthetic test page: a checkerboard with a circle and diagonals.
fn paint_page(canvas: &mut Canvas<'_>, page: Rect, region: Rect) {
    let Some(visible) = page.intersects(&region) else {
        return;
    };
    canvas.fill_rect(visible, Color::from_rgba8(250, 248, 240, 255));

    let cell_width = page.width / GRID as f64;
    let cell_height = page.height / GRID as f64;
    for row in 0..GRID {
        for col in (row % 2..GRID).step_by(2) {
            let cell = Rect::new(
                page.x + col as f64 * cell_width,
                page.y + row as f64 * cell_height,
                cell_width,
                cell_height,
            );
            if cell.intersects(&region).is_none() {
                continue;
            }

            let shade = ((row * GRID + col) * 255 / (GRID * GRID)) as u8;
            canvas.fill_rect(cell, Color::from_rgba8(shade, 96, 255 - shade, 255));
        }
    }

    let mut paint = Paint::default();
    paint.anti_alias = true;

    let radius = (page.width.min(page.height) / 4.0) as f32;
    let center_x = (page.x + page.width / 2.0) as f32;
    let center_y = (page.y + page.height / 2.0) as f32;
    if let Some(circle) = PathBuilder::from_circle(center_x, center_y, radius) {
        paint.set_color(Color::from_rgba8(230, 160, 20, 200));
        canvas.fill_path(&circle, &paint, FillRule::Winding);
    }

    let mut diagonals = PathBuilder::new();
    diagonals.move_to(page.x as f32, page.y as f32);
    diagonals.line_to(page.right() as f32, page.bottom() as f32);
    diagonals.move_to(page.right() as f32, page.y as f32);
    diagonals.line_to(page.x as f32, page.bottom() as f32);
    if let Some(path) = diagonals.finish() {
        paint.set_color(Color::BLACK);
        let stroke = Stroke {
            width: (page.width.min(page.height) / 200.0) as f32,
            ..Stroke::default()
        };
        canvas.stroke_path(&path, &paint, &stroke);
    }
}
