//! Keeps a [`ListObserver`] attached to whatever document a frame holds.
//!
//! The frame element may appear late, its document may be cross-origin or
//! still loading, and every navigation swaps the document out. The watcher
//! polls until it can attach and starts over after each `load`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::observer::ListObserver;
use crate::page::{FrameAccessError, FrameEvent, LiveDocument, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// The frame element is not in the page yet.
    Searching,
    /// Element found; waiting for an accessible, loaded document.
    Attaching,
    /// An observer is attached to the current document.
    Observing,
}

pub struct FrameWatcher {
    page: Page,
    frame: String,
    observer: Arc<ListObserver>,
    frame_poll: Duration,
    access_retry: Duration,
    reload_settle: Duration,
    attempts: Arc<AtomicU64>,
}

/// A running watcher. Dropping it does not stop the task; call
/// [`abort`](Self::abort), which also stops the attached observer.
pub struct WatchHandle {
    state: watch::Receiver<WatchState>,
    task: JoinHandle<()>,
    attempts: Arc<AtomicU64>,
}

impl WatchHandle {
    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// Resolve once the watcher reaches `wanted`.
    pub async fn reached(&mut self, wanted: WatchState) {
        let _ = self.state.wait_for(|s| *s == wanted).await;
    }

    /// Attach attempts made so far, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// The observer task attached to the current frame document.
///
/// Aborted when replaced or dropped, so cancelling the watcher cancels it too.
#[derive(Default)]
struct ObserverSlot(Option<JoinHandle<()>>);

impl ObserverSlot {
    fn replace(&mut self, task: JoinHandle<()>) {
        self.clear();
        self.0 = Some(task);
    }

    fn clear(&mut self) {
        if let Some(task) = self.0.take() {
            task.abort();
        }
    }
}

impl Drop for ObserverSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

impl FrameWatcher {
    pub fn new(page: Page, frame: &str, observer: Arc<ListObserver>, config: &HostConfig) -> Self {
        Self {
            page,
            frame: frame.to_string(),
            observer,
            frame_poll: config.frame_poll(),
            access_retry: config.access_retry(),
            reload_settle: config.reload_settle(),
            attempts: Arc::default(),
        }
    }

    pub fn spawn(self) -> WatchHandle {
        let (tx, state) = watch::channel(WatchState::Searching);
        let attempts = self.attempts.clone();
        let task = tokio::spawn(self.run(tx));
        WatchHandle {
            state,
            task,
            attempts,
        }
    }

    async fn run(self, state: watch::Sender<WatchState>) {
        let mut events = self.page.subscribe();

        while !self.page.has_frame_element(&self.frame) {
            debug!(frame = %self.frame, "frame element not present");
            sleep(self.frame_poll).await;
        }
        info!(frame = %self.frame, "frame element found");
        state.send_replace(WatchState::Attaching);

        let mut observing = ObserverSlot::default();
        let mut retry_at = Some(Instant::now());
        loop {
            let retry = sleep_until(retry_at.unwrap_or_else(Instant::now));
            tokio::select! {
                _ = retry, if retry_at.is_some() => {
                    retry_at = None;
                    match self.try_attach() {
                        Ok(doc) => {
                            observing.replace(self.observer.clone().attach(doc));
                            state.send_replace(WatchState::Observing);
                            info!(frame = %self.frame, "observer attached");
                        }
                        Err(delay) => retry_at = Some(Instant::now() + delay),
                    }
                }
                event = events.recv() => {
                    let reloaded = match event {
                        Ok(FrameEvent::Load { frame }) => frame == self.frame,
                        Err(RecvError::Lagged(_)) => true,
                        Err(RecvError::Closed) => break,
                    };
                    if reloaded {
                        debug!(frame = %self.frame, "frame reloaded, re-attaching");
                        observing.clear();
                        state.send_replace(WatchState::Attaching);
                        retry_at = Some(Instant::now() + self.reload_settle);
                    }
                }
            }
        }
    }

    /// The frame's document if it can be observed now, else how long to wait.
    fn try_attach(&self) -> Result<LiveDocument, Duration> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match self.page.frame_document(&self.frame) {
            Ok(doc) if doc.is_ready() => Ok(doc),
            Ok(_) => {
                debug!(frame = %self.frame, "frame document still loading");
                Err(self.frame_poll)
            }
            Err(err @ FrameAccessError::CrossOrigin(_)) => {
                warn!(error = %err, "cannot access frame document");
                Err(self.access_retry)
            }
            Err(err) => {
                debug!(error = %err, "frame document unavailable");
                Err(self.frame_poll)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, listing, listing_row};
    use triagewatch_core::{Document, ReadyState};
    use url::Url;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn page(body: &str) -> Page {
        Page::new(
            Url::parse("https://portal.example.com/condominio/mensagensV1.aspx").unwrap(),
            Document::parse_html(&format!("<html><body>{body}</body></html>")),
        )
    }

    fn watch(page: &Page, store: &Arc<FakeStore>) -> (WatchHandle, Arc<ListObserver>) {
        let config = HostConfig::default();
        let observer = Arc::new(ListObserver::new(store.clone(), config.debounce()));
        let handle = FrameWatcher::new(page.clone(), "IFC", observer.clone(), &config).spawn();
        (handle, observer)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_frame_element_appears() {
        let page = page("");
        let store = Arc::new(FakeStore::new());
        page.load_frame("IFC", listing(&["1 | a"]));
        let (mut handle, _) = watch(&page, &store);

        tokio::time::sleep(ms(3_500)).await;
        assert_eq!(handle.state(), WatchState::Searching);
        assert!(store.checks().is_empty());

        page.top().mutate(|d| {
            let body = d.body().unwrap();
            d.append_html(body, r#"<iframe id="IFC"></iframe>"#);
        });
        handle.reached(WatchState::Observing).await;
        tokio::time::sleep(ms(10)).await;
        assert_eq!(store.checks(), vec![1]);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_loading_document() {
        let page = page(r#"<iframe id="IFC"></iframe>"#);
        let store = Arc::new(FakeStore::new());
        let mut loading = listing(&["1 | a"]);
        loading.set_ready_state(ReadyState::Interactive);
        let frame = page.load_frame("IFC", loading);
        let (mut handle, observer) = watch(&page, &store);

        tokio::time::sleep(ms(2_500)).await;
        assert_eq!(handle.state(), WatchState::Attaching);
        assert_eq!(observer.scan_count(), 0);

        frame.mutate(|d| d.set_ready_state(ReadyState::Complete));
        handle.reached(WatchState::Observing).await;
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn cross_origin_frame_is_retried() {
        let page = page(r#"<iframe id="IFC"></iframe>"#);
        page.block_frame("IFC");
        let store = Arc::new(FakeStore::new());
        let (mut handle, _) = watch(&page, &store);

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(handle.state(), WatchState::Attaching);

        page.load_frame("IFC", listing(&["7 | a"]));
        handle.reached(WatchState::Observing).await;
        tokio::time::sleep(ms(10)).await;
        assert_eq!(store.checks(), vec![7]);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn cross_origin_retries_are_slower_than_loading_polls() {
        let blocked = page(r#"<iframe id="IFC"></iframe>"#);
        blocked.block_frame("IFC");
        let loading = page(r#"<iframe id="IFC"></iframe>"#);
        let mut doc = listing(&["1 | a"]);
        doc.set_ready_state(ReadyState::Interactive);
        loading.load_frame("IFC", doc);

        let store = Arc::new(FakeStore::new());
        let (blocked_handle, _) = watch(&blocked, &store);
        let (loading_handle, _) = watch(&loading, &store);

        tokio::time::sleep(ms(5_500)).await;
        // Attempts at 0, 2 and 4 s against 0 through 5 s.
        assert_eq!(blocked_handle.attempts(), 3);
        assert_eq!(loading_handle.attempts(), 6);
        assert_eq!(blocked_handle.state(), WatchState::Attaching);
        assert_eq!(loading_handle.state(), WatchState::Attaching);
        blocked_handle.abort();
        loading_handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn aborting_the_watch_stops_its_observer() {
        let page = page(r#"<iframe id="IFC"></iframe>"#);
        let store = Arc::new(FakeStore::new());
        let frame = page.load_frame("IFC", listing(&["1 | a"]));
        let (mut handle, observer) = watch(&page, &store);
        handle.reached(WatchState::Observing).await;
        tokio::time::sleep(ms(10)).await;

        handle.abort();
        tokio::time::sleep(ms(10)).await;
        frame.mutate(|d| {
            let body = d.body().unwrap();
            d.append_html(body, &listing_row(5, "2 | b"));
        });
        tokio::time::sleep(ms(2_000)).await;
        assert_eq!(observer.scan_count(), 1);
        assert_eq!(store.checks_for(2), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reload_moves_observer_to_new_document() {
        let page = page(r#"<iframe id="IFC"></iframe>"#);
        let store = Arc::new(FakeStore::new());
        page.load_frame("IFC", listing(&["1 | a"]));
        let (mut handle, observer) = watch(&page, &store);
        handle.reached(WatchState::Observing).await;
        tokio::time::sleep(ms(10)).await;

        let old = page.frame_document("IFC").unwrap();
        page.load_frame("IFC", listing(&["2 | b"]));
        tokio::time::sleep(ms(100)).await;
        assert_eq!(handle.state(), WatchState::Attaching);

        handle.reached(WatchState::Observing).await;
        tokio::time::sleep(ms(10)).await;
        assert_eq!(store.checks(), vec![1, 2]);
        let scans = observer.scan_count();

        // The old document is no longer observed.
        old.mutate(|d| {
            let body = d.body().unwrap();
            d.append_html(body, &listing_row(5, "3 | c"));
        });
        tokio::time::sleep(ms(2_000)).await;
        assert_eq!(observer.scan_count(), scans);
        assert_eq!(store.checks_for(3), 0);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn other_frames_do_not_reset_the_watch() {
        let page = page(r#"<iframe id="IFC"></iframe><iframe id="IFRAME_DETALHE"></iframe>"#);
        let store = Arc::new(FakeStore::new());
        page.load_frame("IFC", listing(&["1 | a"]));
        let (mut handle, _) = watch(&page, &store);
        handle.reached(WatchState::Observing).await;

        page.load_frame("IFRAME_DETALHE", Document::parse_html("<body></body>"));
        tokio::time::sleep(ms(100)).await;
        assert_eq!(handle.state(), WatchState::Observing);
        handle.abort();
    }
}
