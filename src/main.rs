//! Headless driver for the 360° gallery: loads a frame set, replays a few
//! interactions and logs what the renderer would draw.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result, bail, ensure};
use clap::{ArgAction, Parser, ValueEnum};
use three_sixty_gallery::config::Configuration;
use three_sixty_gallery::events::Direction;
use three_sixty_gallery::gallery::{
    FrameRenderer, GallerySource, IdentityResolver, PaintRequest, ViewHandle,
};
use three_sixty_gallery::gesture::{GestureInterpreter, PointerEvent, minimum_touch_distance};
use three_sixty_gallery::presenter::{GalleryView, InteractionScheduler};
use three_sixty_gallery::tasks::loader::DecodingFetcher;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "three-sixty", about = "360° product gallery driver")]
struct Cli {
    /// Path to YAML config file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Fling once at this percentage of the maximum fling velocity
    #[arg(long, value_name = "PERCENT")]
    fling: Option<u32>,

    /// Rotation direction for --fling, --drag and --rotate
    #[arg(long, value_enum, default_value_t = Spin::Right)]
    direction: Spin,

    /// Drag this many frames
    #[arg(long, value_name = "STEPS")]
    drag: Option<u32>,

    /// Rotate programmatically through this many frames
    #[arg(long, value_name = "FRAMES")]
    rotate: Option<u32>,

    /// Write the thumbnail of the current frame to this PNG file
    #[arg(long, value_name = "PNG")]
    dump_frame: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Spin {
    Left,
    Right,
}

impl From<Spin> for Direction {
    fn from(spin: Spin) -> Self {
        match spin {
            Spin::Left => Direction::Left,
            Spin::Right => Direction::Right,
        }
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("three_sixty_gallery={level}").parse()?)
        .add_directive(format!("three_sixty={level}").parse()?);
    fmt().with_env_filter(filter).with_target(true).compact().init();
    Ok(())
}

#[derive(Default)]
struct LoggingRenderer {
    next_view: AtomicU32,
}

impl FrameRenderer for LoggingRenderer {
    fn create_frame_view(&self) -> ViewHandle {
        ViewHandle(self.next_view.fetch_add(1, Ordering::Relaxed))
    }

    fn paint(&self, request: PaintRequest<'_>) {
        info!(
            index = request.index,
            url = request.url,
            view = request.view.0,
            full_width = request.full_width,
            thumbnail = ?request.bitmap.map(|b| (b.width, b.height)),
            "paint"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewEvent {
    Ready,
    Error,
    Click,
}

struct LoggingView {
    events: mpsc::UnboundedSender<ViewEvent>,
}

impl GalleryView for LoggingView {
    fn show_loading(&mut self, loading: bool) {
        debug!(loading, "loading indicator");
    }

    fn on_frame_advanced(&mut self, direction: Direction) {
        debug!(%direction, "frame advanced");
    }

    fn on_ready(&mut self) {
        info!("gallery ready");
        let _ = self.events.send(ViewEvent::Ready);
    }

    fn on_error(&mut self) {
        warn!("gallery failed to load");
        let _ = self.events.send(ViewEvent::Error);
    }

    fn on_frame_click(&mut self) {
        let _ = self.events.send(ViewEvent::Click);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?
        .validated()
        .context("validating configuration")?;
    let urls = cfg.frame_urls()?;
    ensure!(!urls.is_empty(), "no frames configured");
    info!(count = urls.len(), "frame set");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                cancel.cancel();
            }
        }
    });

    let fetcher = Arc::new(DecodingFetcher::new(
        Arc::new(IdentityResolver),
        cfg.full_cache_capacity,
    ));
    let source = GallerySource::new(fetcher, Arc::new(LoggingRenderer::default()), cfg.base_width);
    source.set_thumbnail_proportion(cfg.thumbnail_proportion);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let scheduler = InteractionScheduler::spawn_with_frame_delay(
        LoggingView { events: events_tx },
        cfg.rotation.frame_delay,
    );
    scheduler.set_fling_physics(Arc::new(cfg.fling.clone()));
    scheduler.set_source(Some(source.clone()));
    source.set_frame_set(urls);

    let outcome = select! {
        _ = cancel.cancelled() => None,
        event = events.recv() => event,
    };
    match outcome {
        Some(ViewEvent::Ready) => {}
        Some(ViewEvent::Error) => {
            shutdown(&scheduler, &source);
            bail!("gallery failed to load");
        }
        _ => {
            shutdown(&scheduler, &source);
            return Ok(());
        }
    }

    let direction = Direction::from(cli.direction);
    let mut gestures = GestureInterpreter::new(
        Arc::new(scheduler.clone()),
        cfg.gesture.maximum_fling_velocity,
        minimum_touch_distance(cfg.base_width, cfg.gesture.touch_distance_divisor),
    );

    if let Some(steps) = cli.drag {
        let distance = minimum_touch_distance(cfg.base_width, cfg.gesture.touch_distance_divisor);
        // positive distance drags left
        let distance_x = if direction == Direction::Left { distance } else { -distance };
        for _ in 0..steps {
            gestures.handle(PointerEvent::Scroll { distance_x });
        }
    }

    if let Some(percent) = cli.fling {
        let speed = cfg.gesture.maximum_fling_velocity * percent as f32 / 100.0;
        // content flung right spins the object right
        let velocity_x = if direction == Direction::Right { speed } else { -speed };
        gestures.handle(PointerEvent::Fling { velocity_x });
        if let Some(task) = gestures.take_fling_task() {
            select! {
                _ = cancel.cancelled() => scheduler.on_fling_stop(),
                joined = task => joined.context("fling task failed")?,
            }
        }
    }

    if let Some(frames) = cli.rotate {
        select! {
            _ = cancel.cancelled() => {}
            _ = scheduler.rotate(direction, frames, 1.0) => {}
        }
    }

    // commands are applied in order, so the click marks every earlier advance done
    scheduler.on_frame_click();
    while let Some(event) = events.recv().await {
        if event == ViewEvent::Click {
            break;
        }
    }
    info!(index = source.current_index(), url = ?source.current_frame_url(), "final frame");

    if let Some(path) = &cli.dump_frame {
        dump_current_frame(&source, path)?;
    }

    shutdown(&scheduler, &source);
    Ok(())
}

fn dump_current_frame(source: &GallerySource, path: &Path) -> Result<()> {
    let index = source.current_index();
    let Some(frame) = source.cached_frame(index) else {
        bail!("no thumbnail cached for frame {index}");
    };
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.pixels.clone())
        .context("thumbnail buffer does not match its dimensions")?;
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(index, path = %path.display(), "frame written");
    Ok(())
}

fn shutdown(scheduler: &InteractionScheduler, source: &GallerySource) {
    scheduler.clear();
    source.clear();
}
