//! The floating annotation panel on the top-level page.
//!
//! The panel shows the extracted record, carries the operator's triage
//! controls and submits both to the remote store. All state lives in the
//! panel's DOM; this type only knows the page and the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};
use triagewatch_core::schema::portal;
use triagewatch_core::{
    Document, NodeId, OccurrenceRecord, Protocol, ResponsibleParty, TriageAnnotation, extract,
    extract_protocol,
};
use triagewatch_sync::{RemoteStore, UNREACHABLE_MESSAGE, UpsertOutcome};

use crate::observer::ListObserver;
use crate::page::{LiveDocument, Page};

const PANEL_ID: &str = "condominio-extension-form";

const KNOWN_TINT: &str = "#bbf7d0";
const UNKNOWN_TINT: &str = "#f0f4f8";

// ── Panel markup ──

const PROTOCOL_DISPLAY: &str = "displayProtocolo";
const OPENED_AT_DISPLAY: &str = "displayDataHora";
const BLOCK_DISPLAY: &str = "displayBloco";
const UNIT_DISPLAY: &str = "displayUnidade";
const STATUS_DISPLAY: &str = "displayStatus";
const URL_DISPLAY: &str = "displayIframeUrl";

const DEPUTY_CHECK: &str = "chkSubsindico";
const MANAGER_CHECK: &str = "chkSindico";
const ADMIN_CHECK: &str = "chkAdm";
const RESOLVED_CHECK: &str = "chkResolvido";
const RESPONSIBLE_SELECT: &str = "responsabilidadeSelect";
const FEEDBACK: &str = "feedbackIcons";
const SHOWN_AT: &str = "data-shown-at";

/// Select value standing for [`ResponsibleParty::Unassigned`].
const UNASSIGNED_OPTION: &str = "null";

const PANEL_HTML: &str = r#"<div id="condominio-extension-form" style="position: fixed; bottom: 20px; right: 20px; z-index: 99999; width: 340px; background-color: #f0f4f8;">
<div class="form-header"><h3>Triagem de Ocorrência</h3><button type="button" class="close-button" title="Fechar">&#215;</button></div>
<div class="extracted-data">
<p id="displayProtocolo"></p>
<p id="displayDataHora"></p>
<p id="displayBloco"></p>
<p id="displayUnidade"></p>
<p id="displayStatus"></p>
<p id="displayIframeUrl"></p>
</div>
<div class="checkbox-group">
<label><input type="checkbox" id="chkSubsindico"> Subsíndico interagiu</label>
<label><input type="checkbox" id="chkSindico"> Síndico interagiu</label>
<label><input type="checkbox" id="chkAdm"> Administração interagiu</label>
<label><input type="checkbox" id="chkResolvido"> Resolvido</label>
</div>
<label for="responsabilidadeSelect">Responsabilidade:</label>
<select id="responsabilidadeSelect">
<option value="null">Não Atribuído</option>
<option value="sub">Subsíndico</option>
<option value="sindico">Síndico</option>
</select>
<div class="form-actions"><button type="button" id="sendDataBtn">Enviar</button><div id="feedbackIcons"></div></div>
</div>"#;

/// Background tint of an open panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelTint {
    /// The backend already has a record for the protocol.
    Known,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOutcome {
    /// No valid protocol on the page; any open panel was removed.
    Removed,
    /// The panel shows `protocol`; `known` when the backend had a record.
    Shown { protocol: u64, known: bool },
    /// The operator closed the panel while the remote state was loading.
    Closed,
}

/// The icon left in the panel by the last submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub success: bool,
    /// Material icon name shown to the operator.
    pub glyph: String,
    pub title: String,
    /// When the icon was put up.
    pub shown_at: Option<DateTime<Utc>>,
}

pub struct AnnotationPanel {
    page: Page,
    store: Arc<dyn RemoteStore>,
    listing: Option<Arc<ListObserver>>,
    feedback_ttl: Duration,
}

impl AnnotationPanel {
    /// `listing` is refreshed after successful submissions when given.
    pub fn new(
        page: Page,
        store: Arc<dyn RemoteStore>,
        listing: Option<Arc<ListObserver>>,
        feedback_ttl: Duration,
    ) -> Self {
        Self {
            page,
            store,
            listing,
            feedback_ttl,
        }
    }

    /// Show the record extracted from `source`, prefilled from the backend.
    pub async fn present(&self, source: &LiveDocument) -> PanelOutcome {
        let detail_url = self.page.detail_url();
        let record = source.read(|doc| extract(doc, &detail_url));
        let top = self.page.top();

        let Some(protocol) = record.protocol.valid() else {
            if top.mutate(remove_panel) {
                info!(protocol = %record.protocol, "no valid protocol, panel removed");
            }
            return PanelOutcome::Removed;
        };

        top.mutate(|doc| {
            ensure_panel(doc);
            render_record(doc, &record);
        });

        let remote = self.store.check_existing(protocol).await;
        let known = remote.is_some();
        let annotation = remote.map(|r| r.annotation()).unwrap_or_default();

        let applied = top.mutate(|doc| {
            let Some(panel) = doc.get_element_by_id(PANEL_ID) else {
                return false;
            };
            write_controls(doc, &annotation);
            let tint = if known { KNOWN_TINT } else { UNKNOWN_TINT };
            doc.set_style_property(panel, "background-color", tint);
            true
        });
        if !applied {
            debug!(protocol, "panel closed before remote state arrived");
            return PanelOutcome::Closed;
        }
        info!(protocol, known, "panel presented");
        PanelOutcome::Shown { protocol, known }
    }

    /// [`present`](Self::present) only when `source` carries a numeric
    /// protocol label. Pages without one leave the panel alone.
    pub async fn present_if_numeric(&self, source: &LiveDocument) -> Option<PanelOutcome> {
        match source.read(extract_protocol) {
            Protocol::Number(_) => Some(self.present(source).await),
            Protocol::Unparsed(_) => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.page
            .top()
            .read(|doc| doc.get_element_by_id(PANEL_ID).is_some())
    }

    pub fn close(&self) {
        if self.page.top().mutate(remove_panel) {
            debug!("panel closed");
        }
    }

    pub fn tint(&self) -> Option<PanelTint> {
        self.page.top().read(|doc| {
            let panel = doc.get_element_by_id(PANEL_ID)?;
            let tint = doc.style_property(panel, "background-color")?;
            Some(if tint == KNOWN_TINT {
                PanelTint::Known
            } else {
                PanelTint::Unknown
            })
        })
    }

    /// The text of one of the record display lines, by element id.
    pub fn display(&self, id: &str) -> Option<String> {
        self.page.top().read(|doc| {
            let line = doc.get_element_by_id(id)?;
            doc.get_element_by_id(PANEL_ID)?;
            Some(doc.text_content(line))
        })
    }

    /// Current state of the triage controls.
    pub fn annotation(&self) -> Option<TriageAnnotation> {
        self.page.top().read(read_controls)
    }

    /// Set the triage controls as the operator would.
    pub fn set_annotation(&self, annotation: &TriageAnnotation) -> bool {
        self.page.top().mutate(|doc| {
            if doc.get_element_by_id(PANEL_ID).is_none() {
                return false;
            }
            write_controls(doc, annotation);
            true
        })
    }

    pub fn feedback(&self) -> Option<Feedback> {
        self.page.top().read(|doc| {
            let container = doc.get_element_by_id(FEEDBACK)?;
            let icon = doc.element_children(container).next()?;
            Some(Feedback {
                success: doc.element(icon)?.has_class("success"),
                glyph: doc.text_content(icon),
                title: doc.attr(icon, "title").unwrap_or_default().to_string(),
                shown_at: doc
                    .attr(icon, SHOWN_AT)
                    .and_then(|at| DateTime::parse_from_rfc3339(at).ok())
                    .map(|at| at.with_timezone(&Utc)),
            })
        })
    }

    /// Submit the current record and controls.
    ///
    /// The record is extracted again so edits made on the page since the
    /// panel opened are sent. Returns `None` when no panel is open.
    pub async fn submit(&self) -> Option<UpsertOutcome> {
        let source = self.page.detail_source();
        let detail_url = self.page.detail_url();
        let record = source.read(|doc| extract(doc, &detail_url));
        let top = self.page.top();

        let annotation = top.mutate(|doc| {
            let annotation = read_controls(doc)?;
            if let Some(container) = doc.get_element_by_id(FEEDBACK) {
                doc.clear_children(container);
            }
            Some(annotation)
        })?;

        let outcome = self.store.upsert(&record, &annotation).await;
        match &outcome {
            UpsertOutcome::Success { action, id } => info!(%action, %id, "annotation synced"),
            UpsertOutcome::Failure { message } => warn!(%message, "annotation sync failed"),
            UpsertOutcome::Unreachable => warn!("backend unreachable"),
        }

        if let Some(icon) = top.mutate(|doc| render_feedback(doc, &outcome)) {
            self.expire_feedback(icon);
        }

        if outcome.is_success() {
            self.present(&source).await;
            self.refresh_listing(&record).await;
        }
        Some(outcome)
    }

    async fn refresh_listing(&self, record: &OccurrenceRecord) {
        let (Some(observer), Some(protocol)) = (&self.listing, record.protocol.valid()) else {
            return;
        };
        match self.page.frame_document(portal::LISTING_FRAME) {
            Ok(doc) => {
                observer.refresh_protocol(&doc, protocol).await;
            }
            Err(err) => debug!(error = %err, "listing not refreshed"),
        }
    }

    fn expire_feedback(&self, icon: NodeId) {
        let top = self.page.top().clone();
        let ttl = self.feedback_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            top.mutate(|doc| {
                if doc.is_connected(icon) {
                    doc.remove(icon);
                }
            });
        });
    }
}

// ── DOM helpers ──

fn remove_panel(doc: &mut Document) -> bool {
    match doc.get_element_by_id(PANEL_ID) {
        Some(panel) => {
            doc.remove(panel);
            true
        }
        None => false,
    }
}

fn ensure_panel(doc: &mut Document) -> NodeId {
    if let Some(panel) = doc.get_element_by_id(PANEL_ID) {
        return panel;
    }
    let parent = doc.body().unwrap_or(doc.root());
    doc.append_html(parent, PANEL_HTML)
        .into_iter()
        .find(|n| doc.attr(*n, "id") == Some(PANEL_ID))
        .unwrap_or(parent)
}

fn render_record(doc: &mut Document, record: &OccurrenceRecord) {
    for (id, label, value) in [
        (PROTOCOL_DISPLAY, "Protocolo", record.protocol.to_string()),
        (OPENED_AT_DISPLAY, "Data/Hora", record.opened_at.clone()),
        (BLOCK_DISPLAY, "Bloco", record.block.to_string()),
        (UNIT_DISPLAY, "Unidade", record.unit.clone()),
        (STATUS_DISPLAY, "Status", record.status.clone()),
        (URL_DISPLAY, "URL do Iframe", record.detail_url.clone()),
    ] {
        if let Some(line) = doc.get_element_by_id(id) {
            doc.set_text(line, &format!("{label}: {value}"));
        }
    }
}

fn checkboxes(annotation: &TriageAnnotation) -> [(&'static str, bool); 4] {
    [
        (DEPUTY_CHECK, annotation.deputy_involved),
        (MANAGER_CHECK, annotation.manager_involved),
        (ADMIN_CHECK, annotation.admin_involved),
        (RESOLVED_CHECK, annotation.resolved),
    ]
}

fn write_controls(doc: &mut Document, annotation: &TriageAnnotation) {
    for (id, checked) in checkboxes(annotation) {
        let Some(input) = doc.get_element_by_id(id) else {
            continue;
        };
        if checked {
            doc.set_attr(input, "checked", "");
        } else {
            doc.remove_attr(input, "checked");
        }
    }

    let Some(select) = doc.get_element_by_id(RESPONSIBLE_SELECT) else {
        return;
    };
    let wanted = match annotation.responsible {
        ResponsibleParty::Unassigned => UNASSIGNED_OPTION,
        party => party.wire_value(),
    };
    for option in options(doc, select) {
        if doc.attr(option, "value") == Some(wanted) {
            doc.set_attr(option, "selected", "");
        } else {
            doc.remove_attr(option, "selected");
        }
    }

    let assigned = annotation.responsible != ResponsibleParty::Unassigned;
    let (border, background) = if assigned {
        ("#4f46e5", "#e0e7ff")
    } else {
        ("#cbd5e1", "#ffffff")
    };
    doc.set_style_property(select, "border-color", border);
    doc.set_style_property(select, "background-color", background);
}

fn read_controls(doc: &Document) -> Option<TriageAnnotation> {
    doc.get_element_by_id(PANEL_ID)?;
    let checked = |id: &str| {
        doc.get_element_by_id(id)
            .is_some_and(|input| doc.attr(input, "checked").is_some())
    };
    let responsible = doc
        .get_element_by_id(RESPONSIBLE_SELECT)
        .and_then(|select| {
            let options = options(doc, select);
            options
                .iter()
                .find(|o| doc.attr(**o, "selected").is_some())
                .or(options.first())
                .and_then(|o| doc.attr(*o, "value"))
                .map(ResponsibleParty::from_wire)
        })
        .unwrap_or_default();

    Some(TriageAnnotation {
        deputy_involved: checked(DEPUTY_CHECK),
        manager_involved: checked(MANAGER_CHECK),
        admin_involved: checked(ADMIN_CHECK),
        resolved: checked(RESOLVED_CHECK),
        responsible,
    })
}

fn options(doc: &Document, select: NodeId) -> Vec<NodeId> {
    doc.descendants(select)
        .into_iter()
        .filter(|n| doc.tag_name(*n) == Some("option"))
        .collect()
}

/// Put the outcome icon in the feedback area. Returns the icon, or `None`
/// if the panel is gone.
fn render_feedback(doc: &mut Document, outcome: &UpsertOutcome) -> Option<NodeId> {
    let container = doc.get_element_by_id(FEEDBACK)?;
    let (class, glyph, title) = match outcome {
        UpsertOutcome::Success { action, id } => (
            "material-icons feedback-icon success",
            "check_circle",
            format!("Sucesso: {action} - ID: {id}"),
        ),
        UpsertOutcome::Failure { message } => (
            "material-icons feedback-icon error",
            "cancel",
            format!("Erro: {message}"),
        ),
        UpsertOutcome::Unreachable => (
            "material-icons feedback-icon error",
            "error",
            UNREACHABLE_MESSAGE.to_string(),
        ),
    };
    let shown_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let icon = doc.create_element(
        "span",
        &[
            ("class", class),
            ("title", title.as_str()),
            (SHOWN_AT, shown_at.as_str()),
        ],
    );
    doc.set_text(icon, glyph);
    doc.clear_children(container);
    doc.append_child(container, icon);
    Some(icon)
}
