//! Test doubles shared by the host modules.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use triagewatch_core::{Document, OccurrenceRecord, RemoteOccurrence, TriageAnnotation};
use triagewatch_sync::{RemoteStore, UpsertOutcome};

/// In-memory store that records every call.
///
/// A successful upsert is stored, so later checks see it like the real
/// backend would.
#[derive(Default)]
pub(crate) struct FakeStore {
    records: Mutex<HashMap<u64, RemoteOccurrence>>,
    checks: Mutex<Vec<u64>>,
    upserts: Mutex<Vec<(OccurrenceRecord, TriageAnnotation)>>,
    reject_with: Mutex<Option<String>>,
    offline: Mutex<bool>,
    delay: Option<Duration>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `check_existing` sleeps for `delay` first.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn put(&self, protocol: u64, annotation: TriageAnnotation) {
        self.records
            .lock()
            .insert(protocol, remote(protocol, annotation));
    }

    pub fn reject_upserts(&self, message: &str) {
        *self.reject_with.lock() = Some(message.to_string());
    }

    /// Upserts fail as if the request never reached the backend.
    pub fn go_offline(&self) {
        *self.offline.lock() = true;
    }

    pub fn checks(&self) -> Vec<u64> {
        self.checks.lock().clone()
    }

    pub fn checks_for(&self, protocol: u64) -> usize {
        self.checks.lock().iter().filter(|p| **p == protocol).count()
    }

    pub fn upserts(&self) -> Vec<(OccurrenceRecord, TriageAnnotation)> {
        self.upserts.lock().clone()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn check_existing(&self, protocol: u64) -> Option<RemoteOccurrence> {
        self.checks.lock().push(protocol);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.records.lock().get(&protocol).cloned()
    }

    async fn upsert(
        &self,
        record: &OccurrenceRecord,
        annotation: &TriageAnnotation,
    ) -> UpsertOutcome {
        self.upserts.lock().push((record.clone(), *annotation));
        if *self.offline.lock() {
            return UpsertOutcome::Unreachable;
        }
        if let Some(message) = self.reject_with.lock().clone() {
            return UpsertOutcome::failure(message);
        }
        let Some(protocol) = record.protocol.valid() else {
            return UpsertOutcome::failure("Protocolo inválido.");
        };
        let action = if self.records.lock().contains_key(&protocol) {
            "update"
        } else {
            "insert"
        };
        self.put(protocol, *annotation);
        UpsertOutcome::Success {
            action: action.to_string(),
            id: protocol.to_string(),
        }
    }
}

pub(crate) fn remote(protocol: u64, annotation: TriageAnnotation) -> RemoteOccurrence {
    RemoteOccurrence {
        protocol,
        deputy_involved: annotation.deputy_involved,
        manager_involved: annotation.manager_involved,
        admin_involved: annotation.admin_involved,
        resolved: annotation.resolved,
        responsible: annotation.responsible,
    }
}

pub(crate) fn resolved() -> TriageAnnotation {
    TriageAnnotation {
        resolved: true,
        ..TriageAnnotation::default()
    }
}

/// One listing row anchor as the portal renders it.
pub(crate) fn listing_row(ctrl: usize, info: &str) -> String {
    format!(
        r#"<a id="ctl00_conteudo_lvLista_ctrl{ctrl}_lnkEdit" href="javascript:void(0)"><div class="color_button"><div class="esq t80">{info}</div></div></a>"#
    )
}

pub(crate) fn listing(rows: &[&str]) -> Document {
    let rows: String = rows
        .iter()
        .enumerate()
        .map(|(i, info)| listing_row(i, info))
        .collect();
    Document::parse_html(&format!(
        r#"<html><body><div id="lista">{rows}</div></body></html>"#
    ))
}

/// A detail page for `protocol` with one message in the thread.
pub(crate) fn detail(protocol: &str) -> Document {
    Document::parse_html(&format!(
        r#"<html><body>
            <span id="ctl00_conteudo_lblProtocolo">{protocol}</span>
            <span id="ctl00_conteudo_lblEm">03/02/2025 14:22:10</span>
            <select id="ctl00_conteudo_ddlStatus"><option selected>Em andamento</option></select>
            <div class="perfil_ocorrencia">
                <div class="esq t100 s11 truncate">Maria Silva</div>
                <div class="esq t100 s11 truncate">Bloco C - 1203</div>
                <div class="esq t100 s11 truncate">03/02/2025 14:22:10</div>
            </div>
        </body></html>"#
    ))
}
