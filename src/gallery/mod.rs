//! Frame loading: the gallery source state machine and the capabilities it
//! drives (fetch backend, renderer, URL transform).

mod source;
mod url;

use futures::future::BoxFuture;

use crate::error::FetchResult;
use crate::events::{DecodedFrame, LoadingState};

pub use source::{DEFAULT_THUMBNAIL_PROPORTION, GallerySource, ListenerId};
pub use url::{IdentityResolver, UrlResolver, WidthQueryResolver};

/// Retrieves thumbnail and full-size frames.
///
/// Requests are independent; the returned futures may complete in any order.
/// `cancel_all` is advisory: a request past the point of no return may still
/// resolve after it, and the caller filters such late results itself.
/// Implementations must not call back into the gallery source from
/// `cancel_all`, since it is invoked inside the source's critical section.
pub trait FrameFetcher: Send + Sync + 'static {
    fn load_thumbnail(&self, url: &str, width: u32, index: usize)
    -> BoxFuture<'static, FetchResult>;

    fn load_full(&self, url: &str, width: u32, index: usize) -> BoxFuture<'static, FetchResult>;

    fn cancel_all(&self);
}

/// Opaque handle to a displayable frame view owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u32);

/// Everything a renderer needs to bind one frame into a view.
#[derive(Debug, Clone, Copy)]
pub struct PaintRequest<'a> {
    pub index: usize,
    pub url: &'a str,
    pub view: ViewHandle,
    pub full_width: u32,
    pub thumbnail_width: u32,
    /// Cached thumbnail, when the thumbnail pass stored one for this index.
    pub bitmap: Option<&'a DecodedFrame>,
}

pub trait FrameRenderer: Send + Sync + 'static {
    fn create_frame_view(&self) -> ViewHandle;

    fn paint(&self, request: PaintRequest<'_>);
}

/// Observer of a gallery source's loading state.
///
/// Called from inside the source's critical section, which is what keeps
/// delivery order equal to transition order across racing completions.
///
/// # Deadlocks
///
/// Any synchronous call back into the same [`GallerySource`] from
/// `on_loading_state_changed` (including read-only accessors such as
/// `loading_state()`) deadlocks, since the source's mutex is not reentrant.
/// Hand the state off instead, for example over a channel to a task, and
/// query the source from there. Closures registered through the blanket impl
/// below are subject to the same rule.
pub trait LoadingStateListener: Send + Sync + 'static {
    fn on_loading_state_changed(&self, state: LoadingState);
}

/// Closure listeners. See the `# Deadlocks` section on [`LoadingStateListener`].
impl<F> LoadingStateListener for F
where
    F: Fn(LoadingState) + Send + Sync + 'static,
{
    fn on_loading_state_changed(&self, state: LoadingState) {
        self(state)
    }
}
