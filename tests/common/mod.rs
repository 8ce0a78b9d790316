#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use three_sixty_gallery::error::{FetchError, FetchResult};
use three_sixty_gallery::events::{DecodedFrame, Direction, LoadingState};
use three_sixty_gallery::gallery::{
    FrameFetcher, FrameRenderer, GallerySource, PaintRequest, ViewHandle,
};
use three_sixty_gallery::presenter::GalleryView;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Thumbnail,
    Full,
}

/// One outstanding fetch; the test decides when and how it completes.
pub struct Request {
    pub pass: Pass,
    pub url: String,
    pub width: u32,
    pub index: usize,
    reply: oneshot::Sender<FetchResult>,
}

impl Request {
    pub fn succeed(self) {
        let frame = frame(&self.url, self.width);
        let _ = self.reply.send(Ok(Some(frame)));
    }

    pub fn empty(self) {
        let _ = self.reply.send(Ok(None));
    }

    pub fn fail(self) {
        let message = format!("cannot fetch {}", self.url);
        let _ = self.reply.send(Err(FetchError::Backend(message)));
    }
}

/// Fetch backend whose requests are completed by hand from the test.
pub struct ScriptedFetcher {
    requests: mpsc::UnboundedSender<Request>,
    pub cancels: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Request>) {
        let (requests, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            requests,
            cancels: AtomicUsize::new(0),
        };
        (Arc::new(fetcher), rx)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    fn request(&self, pass: Pass, url: &str, width: u32, index: usize) -> BoxFuture<'static, FetchResult> {
        let (reply, rx) = oneshot::channel();
        let _ = self.requests.send(Request {
            pass,
            url: url.to_owned(),
            width,
            index,
            reply,
        });
        async move { rx.await.unwrap_or(Err(FetchError::Cancelled)) }.boxed()
    }
}

impl FrameFetcher for ScriptedFetcher {
    fn load_thumbnail(&self, url: &str, width: u32, index: usize) -> BoxFuture<'static, FetchResult> {
        self.request(Pass::Thumbnail, url, width, index)
    }

    fn load_full(&self, url: &str, width: u32, index: usize) -> BoxFuture<'static, FetchResult> {
        self.request(Pass::Full, url, width, index)
    }

    fn cancel_all(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct PaintLog {
    next_view: AtomicU32,
    pub painted: Mutex<Vec<(usize, ViewHandle)>>,
}

impl PaintLog {
    pub fn count(&self) -> usize {
        self.painted.lock().len()
    }
}

impl FrameRenderer for PaintLog {
    fn create_frame_view(&self) -> ViewHandle {
        ViewHandle(self.next_view.fetch_add(1, Ordering::SeqCst))
    }

    fn paint(&self, request: PaintRequest<'_>) {
        self.painted.lock().push((request.index, request.view));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen {
    Loading(bool),
    Advanced(Direction),
    Ready,
    Error,
    Click,
}

pub struct ChannelView(pub mpsc::UnboundedSender<Seen>);

impl GalleryView for ChannelView {
    fn show_loading(&mut self, loading: bool) {
        let _ = self.0.send(Seen::Loading(loading));
    }
    fn on_frame_advanced(&mut self, direction: Direction) {
        let _ = self.0.send(Seen::Advanced(direction));
    }
    fn on_ready(&mut self) {
        let _ = self.0.send(Seen::Ready);
    }
    fn on_error(&mut self) {
        let _ = self.0.send(Seen::Error);
    }
    fn on_frame_click(&mut self) {
        let _ = self.0.send(Seen::Click);
    }
}

pub fn frame(url: &str, width: u32) -> DecodedFrame {
    DecodedFrame {
        source: url.to_owned(),
        width,
        height: 1,
        pixels: vec![0; width as usize * 4],
    }
}

pub fn urls(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}/frame-{i:02}.jpg")).collect()
}

/// Records every state a source announces to a listener.
pub fn record_states(source: &GallerySource) -> Arc<Mutex<Vec<LoadingState>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    source.add_loading_state_listener(Arc::new(move |state: LoadingState| sink.lock().push(state)));
    log
}

pub async fn next_request(rx: &mut mpsc::UnboundedReceiver<Request>) -> Request {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a fetch request")
        .expect("fetcher dropped")
}

pub async fn requests(rx: &mut mpsc::UnboundedReceiver<Request>, n: usize) -> Vec<Request> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(next_request(rx).await);
    }
    out.sort_by_key(|r| r.index);
    out
}

pub async fn wait_for_state(source: &GallerySource, state: LoadingState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while source.loading_state() != state {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {state:?}, still {:?}", source.loading_state()));
}

pub async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for view event")
        .expect("view channel closed")
}

/// Clicks through the render loop and returns every view event seen before
/// the click came back.
pub async fn drain_until_click(
    scheduler: &three_sixty_gallery::presenter::InteractionScheduler,
    rx: &mut mpsc::UnboundedReceiver<Seen>,
) -> Vec<Seen> {
    scheduler.on_frame_click();
    let mut seen = Vec::new();
    loop {
        match next_seen(rx).await {
            Seen::Click => return seen,
            other => seen.push(other),
        }
    }
}
