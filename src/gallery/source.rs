use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{FrameFetcher, FrameRenderer, LoadingStateListener, PaintRequest, ViewHandle};
use crate::error::FetchResult;
use crate::events::{DecodedFrame, Direction, LoadingState};

pub const DEFAULT_THUMBNAIL_PROPORTION: u32 = 4;

/// Registration handle returned by [`GallerySource::add_loading_state_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Thumbnail,
    Full,
}

/// Owns a frame set, its loading state machine and the thumbnail cache.
///
/// Cloning yields another handle onto the same source. Every read or write of
/// the loading state, the cache and the completion counter happens under one
/// mutex, so per-index completions racing each other (or racing a reset) are
/// serialised. Each reset starts a new cycle; work launched by an older cycle
/// is recognised by its generation and dropped.
#[derive(Clone)]
pub struct GallerySource {
    shared: Arc<Shared>,
}

struct Shared {
    fetcher: Arc<dyn FrameFetcher>,
    renderer: Arc<dyn FrameRenderer>,
    runtime: Handle,
    full_width: u32,
    state: Mutex<SourceState>,
}

struct SourceState {
    urls: Vec<String>,
    loading: LoadingState,
    cache: Vec<Option<Arc<DecodedFrame>>>,
    completed: usize,
    current_index: usize,
    generation: u64,
    cycle: CancellationToken,
    thumbnail_proportion: u32,
    listeners: Vec<(ListenerId, Arc<dyn LoadingStateListener>)>,
    next_listener: u64,
    views: [ViewHandle; 2],
    visible: Option<usize>,
    cleared: bool,
}

impl SourceState {
    fn fire(&mut self, state: LoadingState) {
        self.loading = state;
        for (_, listener) in &self.listeners {
            listener.on_loading_state_changed(state);
        }
    }

    /// Abandons the current cycle: cancels outstanding requests, drops every
    /// cached frame and announces `NotLoaded`.
    fn reset(&mut self, fetcher: &dyn FrameFetcher) {
        fetcher.cancel_all();
        self.cycle.cancel();
        self.cycle = CancellationToken::new();
        self.generation += 1;
        self.fire(LoadingState::NotLoaded);
        self.cache = vec![None; self.urls.len()];
        self.completed = 0;
        if self.current_index >= self.urls.len() {
            self.current_index = 0;
        }
        debug!(generation = self.generation, frames = self.urls.len(), "gallery reset");
    }

    fn thumbnail_width(&self, full_width: u32) -> u32 {
        full_width / self.thumbnail_proportion
    }

    fn is_live(&self, generation: u64) -> bool {
        self.generation == generation
            && !matches!(self.loading, LoadingState::NotLoaded | LoadingState::Error)
    }
}

impl GallerySource {
    /// Creates a source bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use [`Self::with_runtime`]
    /// to pass a handle explicitly.
    pub fn new(
        fetcher: Arc<dyn FrameFetcher>,
        renderer: Arc<dyn FrameRenderer>,
        full_width: u32,
    ) -> Self {
        Self::with_runtime(fetcher, renderer, full_width, Handle::current())
    }

    pub fn with_runtime(
        fetcher: Arc<dyn FrameFetcher>,
        renderer: Arc<dyn FrameRenderer>,
        full_width: u32,
        runtime: Handle,
    ) -> Self {
        let views = [renderer.create_frame_view(), renderer.create_frame_view()];
        let state = SourceState {
            urls: Vec::new(),
            loading: LoadingState::NotLoaded,
            cache: Vec::new(),
            completed: 0,
            current_index: 0,
            generation: 0,
            cycle: CancellationToken::new(),
            thumbnail_proportion: DEFAULT_THUMBNAIL_PROPORTION,
            listeners: Vec::new(),
            next_listener: 0,
            views,
            visible: None,
            cleared: false,
        };
        Self {
            shared: Arc::new(Shared {
                fetcher,
                renderer,
                runtime,
                full_width,
                state: Mutex::new(state),
            }),
        }
    }

    /// Assigns a new frame set and starts loading it.
    ///
    /// Re-assigning the same set while it is already loaded only re-announces
    /// `Loaded`; no request is issued.
    pub fn set_frame_set(&self, urls: Vec<String>) {
        let mut st = self.shared.state.lock();
        if st.cleared {
            warn!("set_frame_set on a cleared gallery source ignored");
            return;
        }
        if st.urls == urls && st.loading == LoadingState::Loaded {
            st.fire(LoadingState::Loaded);
            return;
        }
        st.urls = urls;
        st.reset(&*self.shared.fetcher);
        self.shared.start_loading(&mut st);
    }

    pub fn load(&self) {
        let mut st = self.shared.state.lock();
        if st.cleared {
            warn!("load on a cleared gallery source ignored");
            return;
        }
        if st.loading == LoadingState::Loaded {
            st.fire(LoadingState::Loaded);
            return;
        }
        self.shared.start_loading(&mut st);
    }

    /// Aborts an in-progress load and returns to `NotLoaded`. No-op otherwise.
    pub fn cancel(&self) {
        let mut st = self.shared.state.lock();
        if st.loading == LoadingState::Loading {
            info!("cancelling gallery load");
            st.reset(&*self.shared.fetcher);
        }
    }

    /// Tears down all outstanding work and drops every listener. The source
    /// must not be reused afterwards.
    pub fn clear(&self) {
        let mut st = self.shared.state.lock();
        st.listeners.clear();
        st.urls.clear();
        st.reset(&*self.shared.fetcher);
        st.cleared = true;
    }

    /// Moves the current index one step and paints the resulting frame.
    ///
    /// An empty frame set is a no-op. An index that ends up out of bounds is
    /// silently not painted.
    pub fn advance(&self, direction: Direction) {
        let (index, url, view, thumbnail_width, bitmap) = {
            let mut st = self.shared.state.lock();
            let count = st.cache.len();
            if count == 0 {
                return;
            }
            let last = count - 1;
            st.current_index = match direction {
                Direction::Left if st.current_index == 0 => last,
                Direction::Left => st.current_index - 1,
                Direction::Right if st.current_index >= last => 0,
                Direction::Right => st.current_index + 1,
                Direction::None => st.current_index,
            };
            let index = st.current_index;
            if index > last {
                trace!(index, count, "frame index out of range, skipping paint");
                return;
            }

            let back = st.visible.map_or(0, |visible| visible ^ 1);
            st.visible = Some(back);
            (
                index,
                st.urls[index].clone(),
                st.views[back],
                st.thumbnail_width(self.shared.full_width),
                st.cache[index].clone(),
            )
        };

        self.shared.renderer.paint(PaintRequest {
            index,
            url: &url,
            view,
            full_width: self.shared.full_width,
            thumbnail_width,
            bitmap: bitmap.as_deref(),
        });
    }

    /// Registers a listener and immediately hands it the current state.
    ///
    /// # Deadlocks
    ///
    /// The listener runs with the source locked, both for this replay and
    /// for every later transition; it must not call back into this source
    /// synchronously. See [`LoadingStateListener`].
    pub fn add_loading_state_listener(&self, listener: Arc<dyn LoadingStateListener>) -> ListenerId {
        let mut st = self.shared.state.lock();
        let id = ListenerId(st.next_listener);
        st.next_listener += 1;
        listener.on_loading_state_changed(st.loading);
        st.listeners.push((id, listener));
        id
    }

    pub fn remove_loading_state_listener(&self, id: ListenerId) {
        self.shared
            .state
            .lock()
            .listeners
            .retain(|(registered, _)| *registered != id);
    }

    pub fn loading_state(&self) -> LoadingState {
        self.shared.state.lock().loading
    }

    pub fn current_index(&self) -> usize {
        self.shared.state.lock().current_index
    }

    pub fn frame_count(&self) -> usize {
        self.shared.state.lock().cache.len()
    }

    pub fn frame_urls(&self) -> Vec<String> {
        self.shared.state.lock().urls.clone()
    }

    pub fn current_frame_url(&self) -> Option<String> {
        let st = self.shared.state.lock();
        st.urls.get(st.current_index).cloned()
    }

    /// Thumbnail cached for `index`, if the current cycle stored one.
    pub fn cached_frame(&self, index: usize) -> Option<Arc<DecodedFrame>> {
        self.shared.state.lock().cache.get(index).cloned().flatten()
    }

    pub fn cached_frame_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .cache
            .iter()
            .filter(|entry| entry.is_some())
            .count()
    }

    /// View painted by the most recent `advance`.
    pub fn visible_view(&self) -> Option<ViewHandle> {
        let st = self.shared.state.lock();
        st.visible.map(|slot| st.views[slot])
    }

    pub fn full_width(&self) -> u32 {
        self.shared.full_width
    }

    pub fn thumbnail_width(&self) -> u32 {
        self.shared
            .state
            .lock()
            .thumbnail_width(self.shared.full_width)
    }

    pub fn thumbnail_proportion(&self) -> u32 {
        self.shared.state.lock().thumbnail_proportion
    }

    /// Takes effect on the next thumbnail pass; does not reload by itself.
    pub fn set_thumbnail_proportion(&self, proportion: u32) {
        if proportion == 0 {
            warn!("thumbnail proportion must be at least 1; keeping previous value");
            return;
        }
        self.shared.state.lock().thumbnail_proportion = proportion;
    }
}

impl Shared {
    fn start_loading(self: &Arc<Self>, st: &mut SourceState) {
        st.fire(LoadingState::Loading);
        self.dispatch(st, Pass::Thumbnail);
    }

    /// Launches one independent task per frame. Returns without waiting.
    fn dispatch(self: &Arc<Self>, st: &SourceState, pass: Pass) {
        let width = match pass {
            Pass::Thumbnail => st.thumbnail_width(self.full_width),
            Pass::Full => self.full_width,
        };
        debug!(?pass, width, frames = st.urls.len(), generation = st.generation, "dispatching frame requests");
        for (index, url) in st.urls.iter().enumerate() {
            let shared = Arc::clone(self);
            let url = url.clone();
            let generation = st.generation;
            let cycle = st.cycle.clone();
            self.runtime.spawn(async move {
                shared
                    .run_request(pass, generation, index, url, width, cycle)
                    .await;
            });
        }
    }

    async fn run_request(
        self: Arc<Self>,
        pass: Pass,
        generation: u64,
        index: usize,
        url: String,
        width: u32,
        cycle: CancellationToken,
    ) {
        // A reset may already have happened before this task got scheduled.
        if !self.state.lock().is_live(generation) {
            trace!(?pass, index, generation, "cycle gone before request started");
            return;
        }

        let request = match pass {
            Pass::Thumbnail => self.fetcher.load_thumbnail(&url, width, index),
            Pass::Full => self.fetcher.load_full(&url, width, index),
        };
        let result = tokio::select! {
            _ = cycle.cancelled() => {
                trace!(?pass, index, generation, "request dropped by reset");
                return;
            }
            result = request => result,
        };

        match pass {
            Pass::Thumbnail => self.on_thumbnail(generation, index, result),
            Pass::Full => on_full_size(index, &url, result),
        }
    }

    fn on_thumbnail(self: &Arc<Self>, generation: u64, index: usize, result: FetchResult) {
        let mut st = self.state.lock();
        if st.generation != generation || st.loading != LoadingState::Loading {
            debug!(index, generation, current = st.generation, "stale thumbnail dropped");
            return;
        }

        match result {
            Ok(Some(frame)) => {
                let newly_filled = match st.cache.get_mut(index) {
                    // the previous bitmap for this index, if any, is dropped here
                    Some(slot) => slot.replace(Arc::new(frame)).is_none(),
                    None => {
                        debug!(index, "thumbnail index out of range");
                        return;
                    }
                };
                if newly_filled {
                    st.completed += 1;
                }
                trace!(index, completed = st.completed, total = st.cache.len(), "thumbnail stored");
                if st.completed == st.cache.len() {
                    info!(frames = st.completed, generation, "all thumbnails loaded");
                    st.fire(LoadingState::Loaded);
                    self.dispatch(&st, Pass::Full);
                }
            }
            Ok(None) => {
                debug!(index, "empty thumbnail ignored");
            }
            Err(err) => {
                warn!(index, error = %err, "thumbnail failed; aborting load");
                st.reset(&*self.fetcher);
                st.fire(LoadingState::Error);
            }
        }
    }
}

// The full-size pass only warms the backend's cache.
fn on_full_size(index: usize, url: &str, result: FetchResult) {
    match result {
        Ok(Some(frame)) => {
            debug!(index, url, width = frame.width, height = frame.height, "full-size frame prefetched")
        }
        Ok(None) => trace!(index, url, "full-size prefetch returned nothing"),
        Err(err) => debug!(index, url, error = %err, "full-size prefetch failed"),
    }
}
