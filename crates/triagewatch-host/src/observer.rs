//! Listing reconciliation.
//!
//! Every occurrence row in the listing frame is checked against the remote
//! store once and recolored when the backend knows it. Rows are marked before
//! any query goes out, so overlapping scans never query the same row twice;
//! a row only becomes eligible again when the portal replaces it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace};
use triagewatch_core::schema::portal;
use triagewatch_core::{Document, NodeId, RemoteOccurrence, listing_protocol};
use triagewatch_sync::RemoteStore;

use crate::page::LiveDocument;

const TRANSITION: &str = "background-color 0.5s ease, border-left 0.3s ease";

/// Color state painted on a listing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Resolved,
    Pending,
}

impl Indicator {
    pub fn for_remote(remote: &RemoteOccurrence) -> Self {
        if remote.resolved {
            Self::Resolved
        } else {
            Self::Pending
        }
    }

    pub fn background(self) -> &'static str {
        match self {
            Self::Resolved => "#d1fae5",
            Self::Pending => "#dbeafe",
        }
    }

    pub fn border(self) -> &'static str {
        match self {
            Self::Resolved => "5px solid #059669",
            Self::Pending => "5px solid #2563eb",
        }
    }

    pub fn tooltip(self, protocol: u64) -> String {
        match self {
            Self::Resolved => format!("✅ Protocolo {protocol}: Sincronizado e Resolvido"),
            Self::Pending => format!("⚠️ Protocolo {protocol}: Sincronizado (Pendente)"),
        }
    }

    /// The indicator currently painted on `entry`, if any.
    pub fn painted_on(doc: &Document, entry: NodeId) -> Option<Self> {
        let target = doc.query_selector(entry, &portal::ENTRY_INDICATOR)?;
        let background = doc.style_property(target, "background-color")?;
        [Self::Resolved, Self::Pending]
            .into_iter()
            .find(|i| i.background() == background)
    }

    /// Recolor `entry`. Returns `false` if it left the document or has no
    /// indicator element.
    fn paint(self, doc: &mut Document, entry: NodeId, protocol: u64) -> bool {
        if !doc.is_connected(entry) {
            return false;
        }
        let Some(target) = doc.query_selector(entry, &portal::ENTRY_INDICATOR) else {
            return false;
        };
        doc.set_style_property(target, "transition", TRANSITION);
        doc.set_style_property(target, "background-color", self.background());
        doc.set_style_property(target, "border-left", self.border());
        doc.set_attr(target, "title", &self.tooltip(protocol));
        true
    }
}

/// Counts from one pass over the listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Row anchors found.
    pub entries: usize,
    /// Rows already marked by an earlier pass.
    pub skipped: usize,
    /// Rows queried in this pass.
    pub queried: usize,
    pub resolved: usize,
    pub pending: usize,
    /// Queried rows the backend does not know.
    pub absent: usize,
    /// Known rows that left the document or have no indicator element.
    pub unpainted: usize,
}

impl ScanReport {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Painted(Indicator::Resolved) => self.resolved += 1,
            Resolution::Painted(Indicator::Pending) => self.pending += 1,
            Resolution::Absent => self.absent += 1,
            Resolution::Unpainted => self.unpainted += 1,
        }
    }
}

/// What became of one queried row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Painted(Indicator),
    Absent,
    Unpainted,
}

/// Restartable quiet-period timer.
#[derive(Debug)]
pub struct Debounce {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// (Re)start the quiet period from now.
    pub fn bump(&mut self) {
        self.deadline = Some(Instant::now() + self.quiet);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

/// Reconciles listing rows against the remote store.
pub struct ListObserver {
    store: Arc<dyn RemoteStore>,
    debounce: Duration,
    scans: AtomicU64,
}

impl ListObserver {
    pub fn new(store: Arc<dyn RemoteStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            scans: AtomicU64::new(0),
        }
    }

    /// Number of scans started so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Scan `doc` now, then again after every burst of structural changes.
    ///
    /// The task runs until aborted.
    pub fn attach(self: Arc<Self>, doc: LiveDocument) -> JoinHandle<()> {
        tokio::spawn(async move { self.observe(doc).await })
    }

    async fn observe(&self, doc: LiveDocument) {
        let mut mutations = doc.subscribe();
        let report = self.rescan(&doc).await;
        info!(entries = report.entries, queried = report.queried, "observing listing");

        let mut debounce = Debounce::new(self.debounce);
        loop {
            let quiet = sleep_until(debounce.deadline().unwrap_or_else(Instant::now));
            tokio::select! {
                batch = mutations.recv() => match batch {
                    Ok(batch) if batch.added > 0 => debounce.bump(),
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "mutation feed lagged");
                        debounce.bump();
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = quiet, if debounce.is_armed() => {
                    debounce.clear();
                    self.rescan(&doc).await;
                }
            }
        }
    }

    /// One pass: mark every unmarked row with a protocol, then query them all
    /// concurrently and paint each as its answer arrives.
    pub async fn rescan(&self, doc: &LiveDocument) -> ScanReport {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let mut report = ScanReport::default();

        let queued = doc.mutate(|d| {
            let entries = d.query_selector_all(d.root(), &portal::LISTING_ENTRY);
            report.entries = entries.len();
            let mut queued = Vec::new();
            for entry in entries {
                if d.is_processed(entry) {
                    report.skipped += 1;
                    continue;
                }
                let Some(protocol) = entry_protocol(d, entry) else {
                    trace!(?entry, "row without protocol");
                    continue;
                };
                d.mark_processed(entry);
                queued.push((entry, protocol));
            }
            queued
        });
        report.queried = queued.len();

        let resolutions = join_all(
            queued
                .into_iter()
                .map(|(entry, protocol)| self.resolve(doc, entry, protocol)),
        )
        .await;
        for resolution in resolutions {
            report.record(resolution);
        }

        debug!(
            entries = report.entries,
            queried = report.queried,
            resolved = report.resolved,
            pending = report.pending,
            "listing scanned"
        );
        report
    }

    async fn resolve(&self, doc: &LiveDocument, entry: NodeId, protocol: u64) -> Resolution {
        let Some(remote) = self.store.check_existing(protocol).await else {
            return Resolution::Absent;
        };
        let indicator = Indicator::for_remote(&remote);
        if doc.mutate(|d| indicator.paint(d, entry, protocol)) {
            Resolution::Painted(indicator)
        } else {
            Resolution::Unpainted
        }
    }

    /// Re-resolve rows for `protocol` that were already marked, after a
    /// submission changed its remote state, then scan for new rows.
    pub async fn refresh_protocol(&self, doc: &LiveDocument, protocol: u64) -> ScanReport {
        let stale: Vec<NodeId> = doc.read(|d| {
            d.query_selector_all(d.root(), &portal::LISTING_ENTRY)
                .into_iter()
                .filter(|e| d.is_processed(*e) && entry_protocol(d, *e) == Some(protocol))
                .collect()
        });
        let mut report = self.rescan(doc).await;
        if stale.is_empty() {
            return report;
        }

        let remote = self.store.check_existing(protocol).await;
        report.queried += stale.len();
        let Some(remote) = remote else {
            report.absent += stale.len();
            return report;
        };
        let indicator = Indicator::for_remote(&remote);
        let painted = doc.mutate(|d| {
            stale
                .iter()
                .filter(|e| indicator.paint(d, **e, protocol))
                .count()
        });
        for _ in 0..painted {
            report.record(Resolution::Painted(indicator));
        }
        report.unpainted += stale.len() - painted;
        info!(protocol, ?indicator, rows = painted, "listing refreshed");
        report
    }
}

fn entry_protocol(doc: &Document, entry: NodeId) -> Option<u64> {
    doc.query_selector(entry, &portal::ENTRY_INFO)
        .and_then(|info| listing_protocol(&doc.text_content(info)))
}
