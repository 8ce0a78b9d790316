//! Gesture interpretation: classified pointer events in, semantic
//! drag/fling/tap events out.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::events::Direction;

/// Consumer of the semantic events produced by [`GestureInterpreter`].
pub trait InteractionListener: Send + Sync + 'static {
    /// Starts a fling; the returned future resolves when the fling loop ends.
    fn fling_start(&self, direction: Direction, velocity_percent: u32) -> BoxFuture<'static, ()>;

    fn fling_stop(&self);

    fn drag_step(&self, direction: Direction);

    fn tap(&self);
}

/// Pointer primitives already classified by the platform gesture detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down,
    SingleTapUp,
    /// Horizontal distance scrolled since the previous scroll event, positive
    /// when the content moves left.
    Scroll { distance_x: f32 },
    /// Horizontal fling velocity in pixels per second.
    Fling { velocity_x: f32 },
}

#[derive(Debug, Default)]
struct Armed {
    direction: Direction,
    fling: u64,
}

pub struct GestureInterpreter {
    listener: Arc<dyn InteractionListener>,
    maximum_fling_velocity: f32,
    minimum_touch_distance: f32,
    armed: Arc<Mutex<Armed>>,
    fling_interrupted_by_tap: bool,
    non_consumed_scroll_x: f32,
    runtime: Handle,
    fling_task: Option<JoinHandle<()>>,
}

impl GestureInterpreter {
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(
        listener: Arc<dyn InteractionListener>,
        maximum_fling_velocity: f32,
        minimum_touch_distance: f32,
    ) -> Self {
        Self::with_runtime(
            listener,
            maximum_fling_velocity,
            minimum_touch_distance,
            Handle::current(),
        )
    }

    pub fn with_runtime(
        listener: Arc<dyn InteractionListener>,
        maximum_fling_velocity: f32,
        minimum_touch_distance: f32,
        runtime: Handle,
    ) -> Self {
        Self {
            listener,
            maximum_fling_velocity,
            minimum_touch_distance,
            armed: Arc::new(Mutex::new(Armed::default())),
            fling_interrupted_by_tap: false,
            non_consumed_scroll_x: 0.0,
            runtime,
            fling_task: None,
        }
    }

    /// Direction of the fling still running, `Direction::None` otherwise.
    pub fn current_direction(&self) -> Direction {
        self.armed.lock().direction
    }

    /// Feeds one event; returns whether it was consumed.
    pub fn handle(&mut self, event: PointerEvent) -> bool {
        match event {
            PointerEvent::Down => self.on_down(),
            PointerEvent::SingleTapUp => self.on_single_tap_up(),
            PointerEvent::Scroll { distance_x } => self.on_scroll(distance_x),
            PointerEvent::Fling { velocity_x } => self.on_fling(velocity_x),
        }
    }

    /// A press during a fling stops it and swallows the tap that follows.
    pub fn on_down(&mut self) -> bool {
        self.fling_interrupted_by_tap = false;
        let mut armed = self.armed.lock();
        if armed.direction.is_none() {
            return false;
        }
        debug!(direction = %armed.direction, "fling interrupted by press");
        self.listener.fling_stop();
        armed.direction = Direction::None;
        self.fling_interrupted_by_tap = true;
        true
    }

    pub fn on_single_tap_up(&mut self) -> bool {
        if !self.fling_interrupted_by_tap {
            self.listener.tap();
            return true;
        }
        self.fling_interrupted_by_tap = false;
        false
    }

    pub fn on_scroll(&mut self, distance_x: f32) -> bool {
        self.non_consumed_scroll_x += distance_x;
        if self.non_consumed_scroll_x.abs() < self.minimum_touch_distance {
            return false;
        }

        let direction = direction_from_distance(self.non_consumed_scroll_x);
        self.non_consumed_scroll_x = 0.0;
        trace!(%direction, "drag step");
        self.listener.drag_step(direction);
        self.armed.lock().direction = Direction::None;
        true
    }

    /// Arms the fling direction and hands the animation to the listener.
    /// Once the listener's fling loop ends, the fling is stopped and
    /// disarmed unless a newer fling has been armed meanwhile.
    pub fn on_fling(&mut self, velocity_x: f32) -> bool {
        let velocity_percent = velocity_percent(velocity_x, self.maximum_fling_velocity);
        // content flung one way spins the object the other way
        let direction = if -velocity_x < 0.0 {
            Direction::Right
        } else {
            Direction::Left
        };

        let fling = {
            let mut armed = self.armed.lock();
            armed.direction = direction;
            armed.fling += 1;
            armed.fling
        };
        debug!(%direction, velocity_percent, "fling gesture");

        let listener = Arc::clone(&self.listener);
        let armed = Arc::clone(&self.armed);
        let animation = listener.fling_start(direction, velocity_percent);
        self.fling_task = Some(self.runtime.spawn(async move {
            animation.await;
            let mut armed = armed.lock();
            if armed.fling == fling {
                listener.fling_stop();
                armed.direction = Direction::None;
            }
        }));
        true
    }

    /// Handle of the most recently launched fling task.
    pub fn take_fling_task(&mut self) -> Option<JoinHandle<()>> {
        self.fling_task.take()
    }
}

fn direction_from_distance(distance_x: f32) -> Direction {
    if distance_x > 0.0 {
        Direction::Left
    } else {
        Direction::Right
    }
}

/// Fling speed as a rounded percentage of the device maximum.
pub fn velocity_percent(velocity_x: f32, maximum_fling_velocity: f32) -> u32 {
    if maximum_fling_velocity <= 0.0 {
        return 0;
    }
    (100.0 * velocity_x.abs() / maximum_fling_velocity).round() as u32
}

/// Drag threshold for a view of `view_width` pixels.
pub fn minimum_touch_distance(view_width: u32, divisor: u32) -> f32 {
    (view_width / divisor.max(1)) as f32
}
