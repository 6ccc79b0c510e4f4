//! Entry point: decide what the current page is and wire up the pieces.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use triagewatch_core::ReadyState;
use triagewatch_core::schema::portal;
use triagewatch_sync::RemoteStore;
use url::Url;

use crate::config::HostConfig;
use crate::frame::{FrameWatcher, WatchHandle, WatchState};
use crate::observer::ListObserver;
use crate::page::{FrameEvent, Page};
use crate::panel::AnnotationPanel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// A single occurrence opened directly.
    Detail,
    /// The listing shell with its listing and detail frames.
    Listing,
    Other,
}

impl PageKind {
    pub fn classify(url: &Url) -> Self {
        let path = url.path();
        if path.contains(portal::DETAIL_PATH_MARKER) {
            Self::Detail
        } else if path.contains(portal::LISTING_PATH_MARKER) {
            Self::Listing
        } else {
            Self::Other
        }
    }
}

/// Everything started for one page.
pub struct Session {
    pub kind: PageKind,
    pub panel: Arc<AnnotationPanel>,
    pub observer: Option<Arc<ListObserver>>,
    watcher: Option<WatchHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// State of the listing frame watcher, on listing pages.
    pub fn watch_state(&self) -> Option<WatchState> {
        self.watcher.as_ref().map(WatchHandle::state)
    }

    /// Wait until the listing observer is attached. Returns at once on
    /// pages without a listing.
    pub async fn observing(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.reached(WatchState::Observing).await;
        }
    }

    /// Stop every background task of the session.
    pub fn shutdown(self) {
        if let Some(watcher) = &self.watcher {
            watcher.abort();
        }
        for task in &self.tasks {
            task.abort();
        }
        debug!(kind = ?self.kind, "session shut down");
    }
}

/// Start the integration on `page`.
///
/// Detail pages get the panel right away. Listing pages get a frame watcher
/// on the listing frame and a follower that presents the panel for every
/// occurrence opened in the detail frame.
pub async fn bootstrap(page: Page, store: Arc<dyn RemoteStore>, config: &HostConfig) -> Session {
    let kind = PageKind::classify(page.url());
    info!(url = %page.url(), ?kind, "bootstrapping");

    match kind {
        PageKind::Detail => {
            let panel = Arc::new(AnnotationPanel::new(
                page.clone(),
                store,
                None,
                config.feedback_ttl(),
            ));
            panel.present_if_numeric(page.top()).await;
            Session {
                kind,
                panel,
                observer: None,
                watcher: None,
                tasks: Vec::new(),
            }
        }
        PageKind::Listing => {
            let observer = Arc::new(ListObserver::new(store.clone(), config.debounce()));
            let watcher =
                FrameWatcher::new(page.clone(), portal::LISTING_FRAME, observer.clone(), config)
                    .spawn();
            let panel = Arc::new(AnnotationPanel::new(
                page.clone(),
                store,
                Some(observer.clone()),
                config.feedback_ttl(),
            ));

            let mut tasks = Vec::new();
            if page.has_frame_element(portal::DETAIL_FRAME) {
                tasks.push(tokio::spawn(follow_detail_frame(
                    page.clone(),
                    panel.clone(),
                    config.detail_settle(),
                )));
            } else {
                debug!("no detail frame on listing page");
            }
            Session {
                kind,
                panel,
                observer: Some(observer),
                watcher: Some(watcher),
                tasks,
            }
        }
        PageKind::Other => {
            debug!("page not handled");
            Session {
                kind,
                panel: Arc::new(AnnotationPanel::new(page, store, None, config.feedback_ttl())),
                observer: None,
                watcher: None,
                tasks: Vec::new(),
            }
        }
    }
}

/// Present the panel for every document loaded into the detail frame, and
/// once for a document that finished loading before we got here.
async fn follow_detail_frame(page: Page, panel: Arc<AnnotationPanel>, settle: Duration) {
    let mut events = page.subscribe();
    let initial = tokio::time::sleep(settle);
    tokio::pin!(initial);
    let mut initial_pending = true;

    loop {
        tokio::select! {
            _ = &mut initial, if initial_pending => {
                initial_pending = false;
                match page.frame_document(portal::DETAIL_FRAME) {
                    Ok(doc) if doc.read(|d| d.ready_state()) == ReadyState::Complete => {
                        panel.present_if_numeric(&doc).await;
                    }
                    Ok(_) => debug!("detail frame still loading"),
                    Err(err) => debug!(error = %err, "detail frame not yet available"),
                }
            }
            event = events.recv() => match event {
                Ok(FrameEvent::Load { frame }) if frame == portal::DETAIL_FRAME => {
                    match page.frame_document(portal::DETAIL_FRAME) {
                        Ok(doc) => {
                            panel.present_if_numeric(&doc).await;
                        }
                        Err(err) => warn!(error = %err, "cannot read detail frame"),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => debug!(missed, "frame events lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    }
}
