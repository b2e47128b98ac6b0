//! Company-context resolution.
//!
//! Every authenticated request carries a home company and the company the
//! session is currently looking at. When the two differ the request acts on
//! behalf of that company's ranking admin instead of the caller, unless the
//! session is in god mode.

use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::permissions::Role;
use crate::schema::users;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub user_id: Uuid,
    pub role: Role,
    pub home_company_id: Uuid,
    pub session_company_id: Uuid,
    pub god_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminPolicy {
    /// Any role may be picked, ranked owner > admin > superadmin > other.
    Ranked,
    /// Only owners and admins qualify.
    OwnerOrAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextDecision {
    Own,
    Substitute { company_id: Uuid, policy: AdminPolicy },
    Forbidden,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("cross-company access requires an impersonation context")]
    Forbidden,
    #[error("no admin found for company {0}")]
    NoAdmin(Uuid),
}

impl From<ContextError> for AppError {
    fn from(value: ContextError) -> Self {
        match value {
            ContextError::Forbidden => AppError::forbidden(value.to_string()),
            ContextError::NoAdmin(_) => AppError::not_found_with(value.to_string()),
        }
    }
}

impl From<&AuthenticatedUser> for TenantContext {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id,
            role: user.role,
            home_company_id: user.company_id,
            session_company_id: user.current_company_id,
            god_mode: user.god_mode,
        }
    }
}

impl TenantContext {
    pub fn is_cross_company(&self) -> bool {
        self.session_company_id != self.home_company_id
    }

    pub fn decide(&self) -> ContextDecision {
        if self.god_mode || !self.is_cross_company() {
            return ContextDecision::Own;
        }

        match self.role {
            Role::Superadmin => ContextDecision::Substitute {
                company_id: self.session_company_id,
                policy: AdminPolicy::Ranked,
            },
            Role::Owner | Role::Admin => ContextDecision::Substitute {
                company_id: self.session_company_id,
                policy: AdminPolicy::OwnerOrAdmin,
            },
            Role::Staff => ContextDecision::Forbidden,
        }
    }

    /// Company whose records this request reads and writes.
    pub fn effective_company_id(&self) -> Uuid {
        match self.decide() {
            ContextDecision::Substitute { company_id, .. } => company_id,
            ContextDecision::Own if self.god_mode => self.session_company_id,
            ContextDecision::Own | ContextDecision::Forbidden => self.home_company_id,
        }
    }

    pub fn ensure_can_access(&self, record_company_id: Uuid) -> Result<(), ContextError> {
        if self.god_mode {
            return Ok(());
        }
        if matches!(self.decide(), ContextDecision::Forbidden) {
            return Err(ContextError::Forbidden);
        }
        if record_company_id == self.effective_company_id() {
            Ok(())
        } else {
            Err(ContextError::Forbidden)
        }
    }
}

#[derive(Debug, Clone, Queryable)]
pub struct AdminCandidate {
    pub id: Uuid,
    pub role: String,
    pub created_at: NaiveDateTime,
}

pub fn role_rank(role: &str) -> u8 {
    match role {
        "owner" => 0,
        "admin" => 1,
        "superadmin" => 2,
        _ => 3,
    }
}

fn qualifies(role: &str, policy: AdminPolicy) -> bool {
    match policy {
        AdminPolicy::Ranked => true,
        AdminPolicy::OwnerOrAdmin => matches!(role, "owner" | "admin"),
    }
}

/// Highest-ranked qualifying candidate, oldest account first on ties.
pub fn pick_ranking_admin(candidates: &[AdminCandidate], policy: AdminPolicy) -> Option<Uuid> {
    candidates
        .iter()
        .filter(|candidate| qualifies(&candidate.role, policy))
        .min_by(|a, b| {
            role_rank(&a.role)
                .cmp(&role_rank(&b.role))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        })
        .map(|candidate| candidate.id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub impersonating: bool,
}

pub fn resolve_target_user(
    conn: &mut PgConnection,
    ctx: &TenantContext,
) -> Result<ResolvedTarget, AppError> {
    match ctx.decide() {
        ContextDecision::Own => Ok(ResolvedTarget {
            user_id: ctx.user_id,
            company_id: ctx.home_company_id,
            impersonating: false,
        }),
        ContextDecision::Forbidden => Err(ContextError::Forbidden.into()),
        ContextDecision::Substitute { company_id, policy } => {
            let candidates: Vec<AdminCandidate> = users::table
                .filter(users::company_id.eq(company_id))
                .select((users::id, users::role, users::created_at))
                .load(conn)?;

            let user_id = pick_ranking_admin(&candidates, policy)
                .ok_or(ContextError::NoAdmin(company_id))?;

            tracing::debug!(
                caller_id = %ctx.user_id,
                company_id = %company_id,
                target_user_id = %user_id,
                "resolved impersonation target"
            );

            Ok(ResolvedTarget {
                user_id,
                company_id,
                impersonating: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn ctx(role: Role, god_mode: bool, cross: bool) -> TenantContext {
        let home = Uuid::from_u128(1);
        TenantContext {
            user_id: Uuid::from_u128(100),
            role,
            home_company_id: home,
            session_company_id: if cross { Uuid::from_u128(2) } else { home },
            god_mode,
        }
    }

    fn candidate(id: u128, role: &str, day: u32) -> AdminCandidate {
        AdminCandidate {
            id: Uuid::from_u128(id),
            role: role.to_string(),
            created_at: NaiveDate::from_ymd_opt(2024, 1, day)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn decision_table_covers_every_combination() {
        let session = Uuid::from_u128(2);
        let roles = [Role::Staff, Role::Admin, Role::Owner, Role::Superadmin];
        for role in roles {
            for god_mode in [false, true] {
                for cross in [false, true] {
                    let expected = match (god_mode, cross, role) {
                        (true, _, _) | (false, false, _) => ContextDecision::Own,
                        (false, true, Role::Superadmin) => ContextDecision::Substitute {
                            company_id: session,
                            policy: AdminPolicy::Ranked,
                        },
                        (false, true, Role::Admin | Role::Owner) => ContextDecision::Substitute {
                            company_id: session,
                            policy: AdminPolicy::OwnerOrAdmin,
                        },
                        (false, true, Role::Staff) => ContextDecision::Forbidden,
                    };
                    assert_eq!(
                        ctx(role, god_mode, cross).decide(),
                        expected,
                        "role={role} god_mode={god_mode} cross={cross}"
                    );
                }
            }
        }
    }

    #[test]
    fn ranked_policy_prefers_owner_then_admin_then_superadmin() {
        let candidates = vec![
            candidate(1, "staff", 1),
            candidate(2, "superadmin", 2),
            candidate(3, "admin", 3),
            candidate(4, "owner", 4),
        ];
        assert_eq!(
            pick_ranking_admin(&candidates, AdminPolicy::Ranked),
            Some(Uuid::from_u128(4))
        );
        assert_eq!(
            pick_ranking_admin(&candidates[..2], AdminPolicy::Ranked),
            Some(Uuid::from_u128(2))
        );
        assert_eq!(
            pick_ranking_admin(&candidates[..1], AdminPolicy::Ranked),
            Some(Uuid::from_u128(1))
        );
    }

    #[test]
    fn ties_break_on_earliest_creation() {
        let candidates = vec![candidate(7, "admin", 9), candidate(8, "admin", 3)];
        assert_eq!(
            pick_ranking_admin(&candidates, AdminPolicy::OwnerOrAdmin),
            Some(Uuid::from_u128(8))
        );
    }

    #[test]
    fn owner_or_admin_policy_ignores_other_roles() {
        let candidates = vec![candidate(1, "superadmin", 1), candidate(2, "staff", 1)];
        assert_eq!(pick_ranking_admin(&candidates, AdminPolicy::OwnerOrAdmin), None);
    }

    #[test]
    fn effective_company_follows_the_session_when_permitted() {
        let home = Uuid::from_u128(1);
        let session = Uuid::from_u128(2);
        assert_eq!(ctx(Role::Superadmin, false, true).effective_company_id(), session);
        assert_eq!(ctx(Role::Superadmin, true, true).effective_company_id(), session);
        assert_eq!(ctx(Role::Admin, false, true).effective_company_id(), session);
        assert_eq!(ctx(Role::Staff, false, true).effective_company_id(), home);
        assert_eq!(ctx(Role::Staff, false, false).effective_company_id(), home);
    }

    #[test]
    fn record_guard_rejects_foreign_companies() {
        let other = Uuid::from_u128(9);
        assert_eq!(
            ctx(Role::Admin, false, false).ensure_can_access(other),
            Err(ContextError::Forbidden)
        );
        assert_eq!(ctx(Role::Superadmin, true, false).ensure_can_access(other), Ok(()));
        assert_eq!(
            ctx(Role::Staff, false, true).ensure_can_access(Uuid::from_u128(1)),
            Err(ContextError::Forbidden)
        );
        assert_eq!(
            ctx(Role::Owner, false, true).ensure_can_access(Uuid::from_u128(2)),
            Ok(())
        );
    }
}
