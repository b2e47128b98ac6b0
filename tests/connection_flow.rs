mod common;

use anyhow::Result;
use common::{acquire_db_lock, TestApp};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use fieldbook::db;
use fieldbook::permissions::Role;
use fieldbook::state::AppState;
use fieldbook::tenant::TenantContext;
use uuid::Uuid;

#[derive(QueryableByName)]
struct Settings {
    #[diesel(sql_type = Nullable<Text>)]
    company_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    god_mode: Option<String>,
}

fn read_settings(conn: &mut PgConnection) -> QueryResult<Settings> {
    diesel::sql_query(
        "SELECT current_setting('app.current_company_id', true) AS company_id, \
         current_setting('app.god_mode', true) AS god_mode",
    )
    .get_result(conn)
}

#[tokio::test]
async fn plain_checkouts_do_not_inherit_a_company_context() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let state = AppState {
        pool: db::init_pool_with_size(&app.state.config.database_url, 1)?,
        ..app.state.clone()
    };

    let company = Uuid::new_v4();
    let ctx = TenantContext {
        user_id: Uuid::new_v4(),
        role: Role::Superadmin,
        home_company_id: company,
        session_company_id: company,
        god_mode: true,
    };

    {
        let mut conn = state.tenant_db(&ctx).map_err(|err| anyhow::anyhow!("{err}"))?;
        let applied = read_settings(&mut conn)?;
        assert_eq!(applied.company_id, Some(company.to_string()));
        assert_eq!(applied.god_mode.as_deref(), Some("on"));
    }

    let mut conn = state.db().map_err(|err| anyhow::anyhow!("{err}"))?;
    let cleared = read_settings(&mut conn)?;
    assert_eq!(cleared.company_id.as_deref(), Some(""));
    assert_eq!(cleared.god_mode.as_deref(), Some("off"));
    drop(conn);

    app.cleanup().await?;
    Ok(())
}
