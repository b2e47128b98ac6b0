//! Two-stage status classification used by phase reports.
//!
//! Statuses are first normalised into a [`LifecycleStatus`] and then bucketed
//! into a [`ReportPhase`]. Unlike [`crate::phase::map_status_to_phase`],
//! unrecognised input lands in `Unknown` rather than `pending`, and a few
//! statuses are grouped differently. [`divergences`] reports those
//! disagreements so they stay visible.

use serde::Serialize;

use crate::phase::{map_status_to_phase, normalize_status, Phase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStatus {
    Pending,
    Draft,
    Quote,
    Approved,
    Scheduled,
    InProgress,
    OnHold,
    Completed,
    Invoicing,
    Paid,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPhase {
    Pending,
    Quoting,
    Scheduled,
    InProgress,
    Completed,
    Invoicing,
    Paid,
    Unknown,
}

impl From<Phase> for ReportPhase {
    fn from(value: Phase) -> Self {
        match value {
            Phase::Pending => ReportPhase::Pending,
            Phase::Quoting => ReportPhase::Quoting,
            Phase::Scheduled => ReportPhase::Scheduled,
            Phase::InProgress => ReportPhase::InProgress,
            Phase::Completed => ReportPhase::Completed,
            Phase::Invoicing => ReportPhase::Invoicing,
            Phase::Paid => ReportPhase::Paid,
        }
    }
}

pub fn normalize_job_status(status: &str) -> LifecycleStatus {
    match normalize_status(status).as_str() {
        "new" | "pending" | "enquiry" | "inquiry" | "lead" => LifecycleStatus::Pending,
        "draft" => LifecycleStatus::Draft,
        "quote" | "quoting" | "quote_requested" | "quote_sent" | "quoted" | "estimate"
        | "estimating" | "awaiting_approval" => LifecycleStatus::Quote,
        "approved" | "accepted" => LifecycleStatus::Approved,
        "scheduled" | "booked" | "confirmed" => LifecycleStatus::Scheduled,
        "in_progress" | "started" | "active" | "working" | "on_site" | "en_route" => {
            LifecycleStatus::InProgress
        }
        "on_hold" | "paused" => LifecycleStatus::OnHold,
        "completed" | "complete" | "done" | "finished" => LifecycleStatus::Completed,
        "invoicing" | "ready_to_invoice" | "invoiced" | "invoice_sent" | "awaiting_payment"
        | "overdue" => LifecycleStatus::Invoicing,
        "paid" | "payment_received" => LifecycleStatus::Paid,
        "cancelled" | "canceled" | "closed" | "lost" => LifecycleStatus::Cancelled,
        _ => LifecycleStatus::Unknown,
    }
}

pub const fn phase_for_lifecycle(status: LifecycleStatus) -> ReportPhase {
    match status {
        LifecycleStatus::Pending => ReportPhase::Pending,
        LifecycleStatus::Draft | LifecycleStatus::Quote => ReportPhase::Quoting,
        LifecycleStatus::Approved | LifecycleStatus::Scheduled => ReportPhase::Scheduled,
        LifecycleStatus::InProgress => ReportPhase::InProgress,
        LifecycleStatus::Completed => ReportPhase::Completed,
        LifecycleStatus::Invoicing => ReportPhase::Invoicing,
        LifecycleStatus::Paid => ReportPhase::Paid,
        LifecycleStatus::OnHold | LifecycleStatus::Cancelled | LifecycleStatus::Unknown => {
            ReportPhase::Unknown
        }
    }
}

pub fn report_phase(status: &str) -> ReportPhase {
    phase_for_lifecycle(normalize_job_status(status))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub status: String,
    pub canonical: Phase,
    pub reported: ReportPhase,
}

/// Statuses whose canonical phase and report phase disagree.
pub fn divergences<'a, I>(statuses: I) -> Vec<Divergence>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<Divergence> = statuses
        .into_iter()
        .filter_map(|status| {
            let canonical = map_status_to_phase(status);
            let reported = report_phase(status);
            (ReportPhase::from(canonical) != reported).then(|| Divergence {
                status: status.to_string(),
                canonical,
                reported,
            })
        })
        .collect();
    out.sort_by(|a, b| a.status.cmp(&b.status));
    out.dedup_by(|a, b| a.status == b.status);
    out
}
