//! Canonical mapping from free-text job statuses to lifecycle phases.
//!
//! This is the mapping persisted into `jobs.phase`. Reporting uses its own
//! two-stage classification in [`crate::lifecycle`], which does not agree
//! with this table everywhere.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Quoting,
    Scheduled,
    InProgress,
    Completed,
    Invoicing,
    Paid,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Pending,
        Phase::Quoting,
        Phase::Scheduled,
        Phase::InProgress,
        Phase::Completed,
        Phase::Invoicing,
        Phase::Paid,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Quoting => "quoting",
            Phase::Scheduled => "scheduled",
            Phase::InProgress => "in_progress",
            Phase::Completed => "completed",
            Phase::Invoicing => "invoicing",
            Phase::Paid => "paid",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = normalize_status(value);
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == key)
            .ok_or_else(|| format!("unknown phase '{value}'"))
    }
}

pub const DEFAULT_PHASE: Phase = Phase::Pending;

pub(crate) const PHASE_TABLE: &[(Phase, &[&str])] = &[
    (
        Phase::Pending,
        &["pending", "new", "draft", "enquiry", "inquiry", "lead", "on_hold"],
    ),
    (
        Phase::Quoting,
        &[
            "quoting",
            "quote",
            "quote_requested",
            "quote_sent",
            "quoted",
            "estimate",
            "estimating",
            "awaiting_approval",
        ],
    ),
    (
        Phase::Scheduled,
        &["scheduled", "booked", "approved", "accepted", "confirmed"],
    ),
    (
        Phase::InProgress,
        &["in_progress", "started", "active", "working", "on_site", "en_route"],
    ),
    (
        Phase::Completed,
        &["completed", "complete", "done", "finished"],
    ),
    (
        Phase::Invoicing,
        &[
            "invoicing",
            "ready_to_invoice",
            "invoiced",
            "invoice_sent",
            "awaiting_payment",
            "overdue",
        ],
    ),
    (Phase::Paid, &["paid", "payment_received", "closed"]),
];

/// Trims, lowercases and folds spaces and hyphens to underscores.
pub fn normalize_status(status: &str) -> String {
    status
        .trim()
        .chars()
        .map(|ch| match ch {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn map_status_to_phase(status: &str) -> Phase {
    let key = normalize_status(status);
    PHASE_TABLE
        .iter()
        .find(|(_, statuses)| statuses.contains(&key.as_str()))
        .map(|(phase, _)| *phase)
        .unwrap_or(DEFAULT_PHASE)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_listed_status_maps_to_its_phase() {
        for (phase, statuses) in PHASE_TABLE {
            for status in *statuses {
                assert_eq!(map_status_to_phase(status), *phase, "status {status}");
            }
        }
    }

    #[test]
    fn status_lists_are_disjoint() {
        let mut seen = HashSet::new();
        for (_, statuses) in PHASE_TABLE {
            for status in *statuses {
                assert!(seen.insert(*status), "duplicate status {status}");
            }
        }
    }

    #[test]
    fn quote_sent_is_quoting() {
        assert_eq!(map_status_to_phase("quote_sent"), Phase::Quoting);
    }

    #[test]
    fn awaiting_payment_is_invoicing() {
        assert_eq!(map_status_to_phase("awaiting_payment"), Phase::Invoicing);
    }

    #[test]
    fn unknown_status_defaults_to_pending() {
        assert_eq!(map_status_to_phase("foobar"), Phase::Pending);
        assert_eq!(map_status_to_phase(""), Phase::Pending);
    }

    #[test]
    fn matching_ignores_case_whitespace_and_separators() {
        assert_eq!(map_status_to_phase("  Quote Sent "), Phase::Quoting);
        assert_eq!(map_status_to_phase("IN-PROGRESS"), Phase::InProgress);
    }

    #[test]
    fn phase_round_trips_through_its_name() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
        assert!("unknown".parse::<Phase>().is_err());
    }
}
