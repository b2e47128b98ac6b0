use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::{self, PgPool},
    error::{AppError, AppResult},
    storage::AvatarStorage,
    tenant::TenantContext,
    xero::AccountingSync,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub avatars: Arc<dyn AvatarStorage>,
    pub accounting: Option<Arc<dyn AccountingSync>>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        avatars: Arc<dyn AvatarStorage>,
        accounting: Option<Arc<dyn AccountingSync>>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            avatars,
            accounting,
            jwt,
        }
    }

    fn checkout(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    /// Pooled connection without any company context.
    pub fn db(&self) -> AppResult<PgPooledConnection> {
        let mut conn = self.checkout()?;
        db::clear_tenant_settings(&mut conn)?;
        Ok(conn)
    }

    /// Pooled connection with the request's company context applied.
    pub fn tenant_db(&self, ctx: &TenantContext) -> AppResult<PgPooledConnection> {
        let mut conn = self.checkout()?;
        db::apply_tenant_settings(&mut conn, ctx)?;
        Ok(conn)
    }
}
