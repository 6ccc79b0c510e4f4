//! Plain-text rendering of records, remote state and scan results.

use triagewatch_core::{OccurrenceRecord, RemoteOccurrence, TriageAnnotation};
use triagewatch_host::{Indicator, ScanReport};
use triagewatch_sync::{UNREACHABLE_MESSAGE, UpsertOutcome};

const LABEL_WIDTH: usize = 18;

fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {label:<LABEL_WIDTH$} {value}");
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Print an extracted record as a vertical card.
pub fn print_record(record: &OccurrenceRecord) {
    println!("=== Protocolo {} ===", record.protocol);
    field("opened_at", &record.opened_at);
    field("block", record.block);
    field("unit", &record.unit);
    field("status", &record.status);
    field("messages", record.message_count);
    field("last_message_at", &record.last_message_at);
    field("detail_url", &record.detail_url);
}

pub fn print_annotation(annotation: &TriageAnnotation) {
    field("deputy", yes_no(annotation.deputy_involved));
    field("manager", yes_no(annotation.manager_involved));
    field("admin", yes_no(annotation.admin_involved));
    field("resolved", yes_no(annotation.resolved));
    field("responsible", format!("{:?}", annotation.responsible).to_lowercase());
}

pub fn print_remote(protocol: u64, remote: Option<&RemoteOccurrence>) {
    match remote {
        Some(remote) => {
            println!("=== Protocolo {protocol}: known ===");
            print_annotation(&remote.annotation());
        }
        None => println!("=== Protocolo {protocol}: not triaged ==="),
    }
}

/// One line per listing row, then the totals.
pub fn print_scan(rows: &[(String, Option<Indicator>)], report: &ScanReport) {
    for (info, indicator) in rows {
        let mark = match indicator {
            Some(Indicator::Resolved) => "resolved",
            Some(Indicator::Pending) => "pending",
            None => "-",
        };
        println!("  {mark:<10} {info}");
    }
    println!();
    println!(
        "{} rows, {} queried: {} resolved, {} pending, {} unknown, {} not painted",
        report.entries,
        report.queried,
        report.resolved,
        report.pending,
        report.absent,
        report.unpainted
    );
}

pub fn print_outcome(outcome: &UpsertOutcome) {
    match outcome {
        UpsertOutcome::Success { action, id } => println!("synced: {action} (id {id})"),
        UpsertOutcome::Failure { message } => println!("failed: {message}"),
        UpsertOutcome::Unreachable => println!("failed: {UNREACHABLE_MESSAGE}"),
    }
}
