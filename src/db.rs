use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_types::Text;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::tenant::TenantContext;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    init_pool_with_size(database_url, DEFAULT_MAX_POOL_SIZE)
}

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool_size = max_size.max(1);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}

/// Applies pending migrations, stopping at the first failing one.
///
/// Each migration runs in its own transaction, so a failure leaves the
/// schema at the last successfully applied version.
pub fn run_migrations(conn: &mut PgConnection) -> anyhow::Result<Vec<String>> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    Ok(applied.into_iter().map(|version| version.to_string()).collect())
}

/// Publishes the request's company context to the row-level security policies.
pub fn apply_tenant_settings(conn: &mut PgConnection, ctx: &TenantContext) -> QueryResult<()> {
    let god_mode = if ctx.god_mode { "on" } else { "off" };
    diesel::sql_query(
        "SELECT set_config('app.current_company_id', $1, false), \
         set_config('app.god_mode', $2, false)",
    )
    .bind::<Text, _>(ctx.effective_company_id().to_string())
    .bind::<Text, _>(god_mode)
    .execute(conn)?;
    Ok(())
}

/// Drops any company context a previous checkout left on the connection.
pub fn clear_tenant_settings(conn: &mut PgConnection) -> QueryResult<()> {
    diesel::sql_query(
        "SELECT set_config('app.current_company_id', '', false), \
         set_config('app.god_mode', 'off', false)",
    )
    .execute(conn)?;
    Ok(())
}
