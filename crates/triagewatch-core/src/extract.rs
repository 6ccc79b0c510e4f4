//! Field extraction: host markup → [`OccurrenceRecord`].
//!
//! Every function here is pure and total. Each field falls back to its own
//! sentinel when its source element or pattern is missing, so a half-rendered
//! page yields a half-filled record instead of an error.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::dom::{Document, NodeId};
use crate::record::{OccurrenceRecord, Protocol, UNKNOWN_BLOCK, UNKNOWN_UNIT, UNRESOLVED};
use crate::schema::portal;

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Bloco\s+([A-Za-z])").unwrap());
static UNIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\s*(\d+)").unwrap());
static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}/\d{2}/\d{4}\s\d{2}:\d{2}:\d{2})").unwrap());
static LISTING_PROTOCOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*\|").unwrap());

/// Build the canonical record from a detail document.
///
/// `doc` may be the top-level page or the detail frame's document.
/// `detail_url` comes from the top-level page (see [`detail_url`]) because the
/// frame's own document does not know how it was embedded.
pub fn extract(doc: &Document, detail_url: &str) -> OccurrenceRecord {
    let protocol = extract_protocol(doc);
    let opened_at = label_text(doc, portal::OPENED_AT_LABEL).unwrap_or_else(|| UNRESOLVED.into());
    let (block, unit) = block_and_unit(doc);
    let (message_count, last_message_at) = thread_summary(doc);

    let record = OccurrenceRecord {
        protocol,
        opened_at,
        block,
        unit,
        status: selected_status(doc),
        detail_url: detail_url.to_string(),
        message_count,
        last_message_at,
    };
    debug!(
        protocol = %record.protocol,
        block = %record.block,
        unit = %record.unit,
        messages = record.message_count,
        "extracted occurrence"
    );
    record
}

/// Just the protocol field of [`extract`].
pub fn extract_protocol(doc: &Document) -> Protocol {
    match label_text(doc, portal::PROTOCOL_LABEL) {
        Some(text) => Protocol::parse(&text),
        None => Protocol::Unparsed(UNRESOLVED.to_string()),
    }
}

/// Absolute URL of the detail frame as embedded in `top`, or the page URL.
pub fn detail_url(top: &Document, page_url: &Url) -> String {
    top.get_element_by_id(portal::DETAIL_FRAME)
        .and_then(|frame| top.attr(frame, "src"))
        .filter(|src| !src.trim().is_empty())
        .and_then(|src| page_url.join(src.trim()).ok())
        .map(String::from)
        .unwrap_or_else(|| page_url.to_string())
}

/// Protocol number at the start of a listing row ("4521 | Solicitação ...").
pub fn listing_protocol(text: &str) -> Option<u64> {
    LISTING_PROTOCOL_RE
        .captures(text)
        .and_then(|c| c[1].parse().ok())
}

fn label_text(doc: &Document, id: &str) -> Option<String> {
    doc.get_element_by_id(id)
        .map(|el| doc.text_content(el).trim().to_string())
}

/// Block letter and unit from the header profile block, or, when the header
/// has been replaced by the conversation view, from the first message's.
fn block_and_unit(doc: &Document) -> (char, String) {
    let root = doc.root();
    let profile = match doc.query_selector(root, &portal::PROFILE_BLOCK) {
        Some(p) => Some(p),
        None => doc
            .query_selector(root, &portal::THREAD)
            .and_then(|thread| doc.query_selector(thread, &portal::MESSAGE_LINE))
            .and_then(|line| doc.query_selector(line, &portal::PROFILE_BLOCK)),
    };

    let text = profile
        .and_then(|p| doc.query_selector(p, &portal::PROFILE_LINE))
        .map(|line| doc.text_content(line).trim().to_string())
        .unwrap_or_default();

    let block = BLOCK_RE
        .captures(&text)
        .and_then(|c| c[1].chars().next())
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or(UNKNOWN_BLOCK);
    let unit = UNIT_RE
        .captures(&text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| UNKNOWN_UNIT.to_string());
    (block, unit)
}

/// Label of the selected status option: the one flagged `selected`, else the first.
fn selected_status(doc: &Document) -> String {
    let Some(select) = doc.get_element_by_id(portal::STATUS_SELECT) else {
        return UNRESOLVED.to_string();
    };
    let options: Vec<NodeId> = doc
        .descendants(select)
        .into_iter()
        .filter(|n| doc.tag_name(*n) == Some("option"))
        .collect();
    options
        .iter()
        .find(|o| doc.attr(**o, "selected").is_some())
        .or(options.first())
        .map(|o| doc.text_content(*o).trim().to_string())
        .unwrap_or_else(|| UNRESOLVED.to_string())
}

fn thread_summary(doc: &Document) -> (usize, String) {
    let Some(thread) = doc.query_selector(doc.root(), &portal::THREAD) else {
        return (0, UNRESOLVED.to_string());
    };
    let lines = doc.query_selector_all(thread, &portal::MESSAGE_LINE);
    let last_at = lines
        .last()
        .and_then(|line| doc.query_selector(*line, &portal::MESSAGE_DATE))
        .map(|cell| doc.text_content(cell))
        .and_then(|text| TIMESTAMP_RE.captures(text.trim()).map(|c| c[1].to_string()))
        .unwrap_or_else(|| UNRESOLVED.to_string());
    (lines.len(), last_at)
}
