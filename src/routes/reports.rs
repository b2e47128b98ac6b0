use std::collections::BTreeMap;

use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Serialize;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    lifecycle::{divergences, report_phase, Divergence, ReportPhase},
    phase::{map_status_to_phase, Phase},
    schema::jobs,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub total: usize,
    pub canonical: BTreeMap<Phase, usize>,
    pub reported: BTreeMap<ReportPhase, usize>,
    pub divergences: Vec<Divergence>,
}

impl PhaseReport {
    pub fn from_statuses(statuses: &[String]) -> Self {
        let mut canonical: BTreeMap<Phase, usize> =
            Phase::ALL.into_iter().map(|phase| (phase, 0)).collect();
        let mut reported: BTreeMap<ReportPhase, usize> = Phase::ALL
            .into_iter()
            .map(|phase| (ReportPhase::from(phase), 0))
            .chain([(ReportPhase::Unknown, 0)])
            .collect();

        for status in statuses {
            *canonical.entry(map_status_to_phase(status)).or_default() += 1;
            *reported.entry(report_phase(status)).or_default() += 1;
        }

        Self {
            total: statuses.len(),
            canonical,
            reported,
            divergences: divergences(statuses.iter().map(String::as_str)),
        }
    }
}

pub async fn phase_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<PhaseReport>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let statuses: Vec<String> = jobs::table
        .filter(jobs::company_id.eq(ctx.effective_company_id()))
        .select(jobs::status)
        .load(&mut conn)?;
    Ok(Json(PhaseReport::from_statuses(&statuses)))
}
