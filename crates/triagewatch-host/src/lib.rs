//! Host runtime: the live page model, the listing frame watcher and
//! observer, the annotation panel, and the bootstrap that wires them.

mod bootstrap;
mod config;
mod frame;
mod observer;
mod page;
mod panel;

#[cfg(test)]
mod testing;

pub use bootstrap::{PageKind, Session, bootstrap};
pub use config::HostConfig;
pub use frame::{FrameWatcher, WatchHandle, WatchState};
pub use observer::{Debounce, Indicator, ListObserver, ScanReport};
pub use page::{FrameAccessError, FrameContent, FrameEvent, LiveDocument, Page};
pub use panel::{AnnotationPanel, Feedback, PanelOutcome, PanelTint};
