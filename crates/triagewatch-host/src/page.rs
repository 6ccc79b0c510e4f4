//! The host page as seen from the integration: a shared top-level document
//! plus the documents of its named frames.
//!
//! Documents are shared behind a mutex and every structural change is
//! broadcast as a [`MutationBatch`], which is what observers subscribe to.
//! Frame navigations are broadcast as [`FrameEvent::Load`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;
use triagewatch_core::schema::portal;
use triagewatch_core::{Document, MutationBatch, detail_url};
use url::Url;

const MUTATION_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 16;

/// A document that can be read, mutated and observed from several tasks.
///
/// Clones share the same document.
#[derive(Debug, Clone)]
pub struct LiveDocument {
    doc: Arc<Mutex<Document>>,
    mutations: broadcast::Sender<MutationBatch>,
}

impl LiveDocument {
    pub fn new(doc: Document) -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CAPACITY);
        Self {
            doc: Arc::new(Mutex::new(doc)),
            mutations,
        }
    }

    /// Run `f` with shared access. Must not be called re-entrantly.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.doc.lock())
    }

    /// Run `f` with exclusive access, then publish the structural changes it made.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let (out, batch) = {
            let mut doc = self.doc.lock();
            let out = f(&mut doc);
            (out, doc.take_mutations())
        };
        if let Some(batch) = batch {
            // No subscribers is fine.
            let _ = self.mutations.send(batch);
        }
        out
    }

    /// Structural changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MutationBatch> {
        self.mutations.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.read(Document::is_ready)
    }

    /// Whether both handles point at the same document.
    pub fn same_as(&self, other: &LiveDocument) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc)
    }
}

/// What the host knows about a frame's content.
#[derive(Debug, Clone)]
pub enum FrameContent {
    /// Navigated somewhere the integration may not script.
    Blocked,
    Loaded(LiveDocument),
}

/// Navigation events on the page's frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// The frame element with this id finished loading a new document.
    Load { frame: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameAccessError {
    #[error("no frame element with id {0:?}")]
    NoElement(String),
    #[error("frame {0:?} has no document yet")]
    NotLoaded(String),
    #[error("frame {0:?} is cross-origin")]
    CrossOrigin(String),
}

/// The top-level page. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

#[derive(Debug)]
struct PageInner {
    url: Url,
    top: LiveDocument,
    frames: Mutex<HashMap<String, FrameContent>>,
    events: broadcast::Sender<FrameEvent>,
}

impl Page {
    pub fn new(url: Url, top: Document) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(PageInner {
                url,
                top: LiveDocument::new(top),
                frames: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn top(&self) -> &LiveDocument {
        &self.inner.top
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FrameEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the top document currently has an element with id `frame`.
    pub fn has_frame_element(&self, frame: &str) -> bool {
        self.top().read(|doc| doc.get_element_by_id(frame).is_some())
    }

    /// The scriptable document of frame `frame`. Readiness is not checked.
    pub fn frame_document(&self, frame: &str) -> Result<LiveDocument, FrameAccessError> {
        if !self.has_frame_element(frame) {
            return Err(FrameAccessError::NoElement(frame.to_string()));
        }
        match self.inner.frames.lock().get(frame) {
            None => Err(FrameAccessError::NotLoaded(frame.to_string())),
            Some(FrameContent::Blocked) => Err(FrameAccessError::CrossOrigin(frame.to_string())),
            Some(FrameContent::Loaded(doc)) => Ok(doc.clone()),
        }
    }

    /// Replace the content of `frame` with `doc` and fire its load event.
    pub fn load_frame(&self, frame: &str, doc: Document) -> LiveDocument {
        let live = LiveDocument::new(doc);
        self.set_frame(frame, FrameContent::Loaded(live.clone()));
        live
    }

    /// Navigate `frame` somewhere unscriptable and fire its load event.
    pub fn block_frame(&self, frame: &str) {
        self.set_frame(frame, FrameContent::Blocked);
    }

    fn set_frame(&self, frame: &str, content: FrameContent) {
        self.inner.frames.lock().insert(frame.to_string(), content);
        debug!(frame, "frame loaded");
        let _ = self.inner.events.send(FrameEvent::Load {
            frame: frame.to_string(),
        });
    }

    /// The document a detail record is read from: the detail frame's when
    /// it is scriptable, else the top-level one.
    pub fn detail_source(&self) -> LiveDocument {
        self.frame_document(portal::DETAIL_FRAME)
            .unwrap_or_else(|_| self.top().clone())
    }

    /// See [`triagewatch_core::detail_url`].
    pub fn detail_url(&self) -> String {
        self.top().read(|doc| detail_url(doc, self.url()))
    }
}
