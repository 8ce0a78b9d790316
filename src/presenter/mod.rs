//! Interaction scheduling: turns gestures into frame advances and loading
//! state changes into view updates, all applied in order on one render loop.

pub mod fling;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::events::{Direction, LoadingState, RenderCommand};
use crate::gallery::{GallerySource, ListenerId, LoadingStateListener};
use crate::gesture::InteractionListener;

pub use fling::{DefaultFlingPhysics, FlingPhysics};

/// Delay between frames of a programmatic rotation at speed factor 1.
pub const DEFAULT_FRAME_DELAY: Duration = Duration::from_millis(16);

/// Receiver of render-side commands. Every call happens on the render loop,
/// one at a time, in the order the commands were produced.
pub trait GalleryView: Send + 'static {
    fn show_loading(&mut self, loading: bool);

    /// Called after the source painted the frame for `direction`.
    fn on_frame_advanced(&mut self, _direction: Direction) {}

    fn on_ready(&mut self);

    fn on_error(&mut self);

    fn on_frame_click(&mut self);
}

struct Attached {
    source: GallerySource,
    listener: ListenerId,
}

type SourceSlot = Arc<Mutex<Option<Attached>>>;

/// The fling currently allowed to advance frames. Each session gets its own
/// token so stopping or replacing one never revives another.
#[derive(Default)]
struct FlingSlot {
    next_session: u64,
    active: Option<(u64, CancellationToken)>,
}

/// Forwards loading state changes onto the render loop without keeping it
/// alive.
struct StateForwarder {
    tx: mpsc::WeakUnboundedSender<RenderCommand>,
}

impl LoadingStateListener for StateForwarder {
    fn on_loading_state_changed(&self, state: LoadingState) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(RenderCommand::LoadingChanged(state));
        }
    }
}

/// Presenter between gestures, the gallery source and the view.
///
/// Cheap to clone; clones share the same fling session and render loop.
#[derive(Clone)]
pub struct InteractionScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    slot: SourceSlot,
    physics: RwLock<Arc<dyn FlingPhysics>>,
    fling: Mutex<FlingSlot>,
    render_tx: mpsc::UnboundedSender<RenderCommand>,
    cancel: CancellationToken,
    frame_delay: Duration,
}

impl InteractionScheduler {
    /// Spawns the render loop for `view` on the current Tokio runtime.
    pub fn spawn<V: GalleryView>(view: V) -> Self {
        Self::spawn_with_frame_delay(view, DEFAULT_FRAME_DELAY)
    }

    pub fn spawn_with_frame_delay<V: GalleryView>(view: V, frame_delay: Duration) -> Self {
        let (render_tx, render_rx) = mpsc::unbounded_channel();
        let slot: SourceSlot = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();
        tokio::spawn(run_render_loop(
            render_rx,
            Arc::clone(&slot),
            view,
            cancel.clone(),
        ));

        Self {
            shared: Arc::new(Shared {
                slot,
                physics: RwLock::new(Arc::new(DefaultFlingPhysics::default())),
                fling: Mutex::new(FlingSlot::default()),
                render_tx,
                cancel,
                frame_delay,
            }),
        }
    }

    /// Attaches `source` (or detaches with `None`). The previous source stops
    /// being observed but is otherwise left untouched.
    pub fn set_source(&self, source: Option<GallerySource>) {
        let mut slot = self.shared.slot.lock();
        if let Some(previous) = slot.take() {
            previous
                .source
                .remove_loading_state_listener(previous.listener);
        }
        *slot = source.map(|source| {
            let forwarder = StateForwarder {
                tx: self.shared.render_tx.downgrade(),
            };
            let listener = source.add_loading_state_listener(Arc::new(forwarder));
            Attached { source, listener }
        });
    }

    pub fn source(&self) -> Option<GallerySource> {
        self.shared
            .slot
            .lock()
            .as_ref()
            .map(|attached| attached.source.clone())
    }

    pub fn has_source(&self) -> bool {
        self.shared.slot.lock().is_some()
    }

    /// Swaps the fling strategy. Flings already running keep the old one.
    pub fn set_fling_physics(&self, physics: Arc<dyn FlingPhysics>) {
        *self.shared.physics.write() = physics;
    }

    pub fn fling_physics(&self) -> Arc<dyn FlingPhysics> {
        self.shared.physics.read().clone()
    }

    pub fn is_flinging(&self) -> bool {
        self.shared.fling.lock().active.is_some()
    }

    /// Runs a fling to completion or until [`Self::on_fling_stop`].
    ///
    /// Starting a fling stops the previous one. A stopped session never
    /// advances again, so at most the step in flight when the stop arrived
    /// can still reach the view.
    pub async fn on_fling_start(&self, direction: Direction, velocity_percent: u32) {
        let physics = self.fling_physics();
        if direction.is_none() || velocity_percent < physics.minimum_velocity_percent() {
            trace!(%direction, velocity_percent, "fling ignored");
            return;
        }
        let Some(source) = self.source() else {
            return;
        };
        let frame_count = u32::try_from(source.frame_count()).unwrap_or(u32::MAX);
        let steps = physics.spins(velocity_percent).saturating_mul(frame_count);
        let (session, token) = self.begin_fling();
        debug!(%direction, velocity_percent, steps, session, "fling started");

        for step in 1..=steps {
            if token.is_cancelled() {
                debug!(step, session, "fling stopped");
                return;
            }
            self.send(RenderCommand::Advance(direction));
            select! {
                _ = token.cancelled() => {
                    debug!(step, session, "fling stopped");
                    return;
                }
                _ = sleep(physics.step_delay(step, velocity_percent)) => {}
            }
        }
        self.finish_fling(session);
    }

    pub fn on_fling_stop(&self) {
        if let Some((_, token)) = self.shared.fling.lock().active.take() {
            token.cancel();
        }
    }

    pub fn on_drag(&self, direction: Direction) {
        self.send(RenderCommand::Advance(direction));
    }

    pub fn on_loading_state_changed(&self, state: LoadingState) {
        self.send(RenderCommand::LoadingChanged(state));
    }

    pub fn on_frame_click(&self) {
        self.send(RenderCommand::FrameClick);
    }

    /// Advances `frame_count` frames, waiting `frame_delay / speed_factor`
    /// after each one.
    pub async fn rotate(&self, direction: Direction, frame_count: u32, speed_factor: f32) {
        let delay = if speed_factor.is_finite() && speed_factor > 0.0 {
            self.shared.frame_delay.div_f32(speed_factor)
        } else {
            self.shared.frame_delay
        };
        for _ in 0..frame_count {
            self.send(RenderCommand::Advance(direction));
            select! {
                _ = self.shared.cancel.cancelled() => return,
                _ = sleep(delay) => {}
            }
        }
    }

    /// Detaches from the source without clearing it and stops every loop
    /// owned by this scheduler, including the render loop.
    pub fn clear(&self) {
        self.set_source(None);
        self.on_fling_stop();
        self.shared.cancel.cancel();
    }

    fn begin_fling(&self) -> (u64, CancellationToken) {
        let token = self.shared.cancel.child_token();
        let mut slot = self.shared.fling.lock();
        slot.next_session += 1;
        let session = slot.next_session;
        if let Some((_, previous)) = slot.active.replace((session, token.clone())) {
            previous.cancel();
        }
        (session, token)
    }

    fn finish_fling(&self, session: u64) {
        let mut slot = self.shared.fling.lock();
        if slot.active.as_ref().is_some_and(|(active, _)| *active == session) {
            slot.active = None;
        }
    }

    fn send(&self, command: RenderCommand) {
        if self.shared.render_tx.send(command).is_err() {
            trace!(?command, "render loop gone; command dropped");
        }
    }
}

impl InteractionListener for InteractionScheduler {
    fn fling_start(&self, direction: Direction, velocity_percent: u32) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move { this.on_fling_start(direction, velocity_percent).await }.boxed()
    }

    fn fling_stop(&self) {
        self.on_fling_stop();
    }

    fn drag_step(&self, direction: Direction) {
        self.on_drag(direction);
    }

    fn tap(&self) {
        self.on_frame_click();
    }
}

/// Applies render commands to `view` until cancelled or every sender is gone.
async fn run_render_loop<V: GalleryView>(
    mut commands: mpsc::UnboundedReceiver<RenderCommand>,
    slot: SourceSlot,
    mut view: V,
    cancel: CancellationToken,
) {
    loop {
        select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => {
                match command {
                    Some(command) => apply(&slot, &mut view, command),
                    None => break,
                }
            }
        }
    }
    trace!("render loop finished");
}

fn apply<V: GalleryView>(slot: &SourceSlot, view: &mut V, command: RenderCommand) {
    match command {
        RenderCommand::LoadingChanged(LoadingState::NotLoaded | LoadingState::Loading) => {
            view.show_loading(true)
        }
        RenderCommand::LoadingChanged(LoadingState::Loaded) => {
            view.show_loading(false);
            advance(slot, view, Direction::None);
            view.on_ready();
        }
        RenderCommand::LoadingChanged(LoadingState::Error) => {
            view.show_loading(false);
            view.on_error();
        }
        RenderCommand::Advance(direction) => advance(slot, view, direction),
        RenderCommand::FrameClick => view.on_frame_click(),
    }
}

fn advance<V: GalleryView>(slot: &SourceSlot, view: &mut V, direction: Direction) {
    let source = slot.lock().as_ref().map(|attached| attached.source.clone());
    if let Some(source) = source {
        source.advance(direction);
    }
    view.on_frame_advanced(direction);
}
