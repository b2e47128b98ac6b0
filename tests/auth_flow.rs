mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{access_token, acquire_db_lock, read_json, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    let owner = app
        .insert_user(company, "owner@acme.test", "correct-horse", "owner")
        .await?;

    let token = app.login_token("  Owner@ACME.test ", "correct-horse").await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = read_json(response).await?;

    assert_eq!(me["user"]["user_id"], json!(owner));
    assert_eq!(me["user"]["role"], "owner");
    assert_eq!(me["effective_company_id"], json!(company));
    assert_eq!(me["impersonating"], false);
    assert_eq!(me["permissions"]["can_manage_company"], true);
    assert_eq!(me["permissions"]["can_use_god_mode"], false);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", "correct-horse", "owner")
        .await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "owner@acme.test", "password": "battery-staple" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/jobs", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn admins_switch_only_into_granted_companies() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let home = app.insert_company("Home Electrical").await?;
    let other = app.insert_company("Other Electrical").await?;
    let admin = app
        .insert_user(home, "admin@home.test", "correct-horse", "admin")
        .await?;
    app.insert_user(other, "owner@other.test", "correct-horse", "owner")
        .await?;
    app.insert_user(home, "staff@home.test", "correct-horse", "staff")
        .await?;

    let token = app.login_token("admin@home.test", "correct-horse").await?;
    let payload = json!({ "company_id": other });

    let response = app
        .post_json("/api/auth/switch-company", &payload, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.grant_access(admin, other).await?;
    let response = app
        .post_json("/api/auth/switch-company", &payload, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let switched = access_token(response).await?;

    let me: Value = read_json(app.get("/api/auth/me", Some(&switched)).await?).await?;
    assert_eq!(me["effective_company_id"], json!(other));
    assert_eq!(me["user"]["company_id"], json!(home));
    assert_eq!(me["impersonating"], true);

    let staff_token = app.login_token("staff@home.test", "correct-horse").await?;
    let response = app
        .post_json("/api/auth/switch-company", &payload, Some(&staff_token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/auth/switch-company",
            &json!({ "company_id": Uuid::new_v4() }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn god_mode_is_reserved_for_superadmins() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Platform").await?;
    app.insert_user(company, "admin@platform.test", "correct-horse", "admin")
        .await?;
    app.insert_user(company, "root@platform.test", "correct-horse", "superadmin")
        .await?;

    let admin_token = app.login_token("admin@platform.test", "correct-horse").await?;
    let response = app
        .post_json("/api/auth/god-mode", &json!({ "enabled": true }), Some(&admin_token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let root_token = app.login_token("root@platform.test", "correct-horse").await?;
    let response = app
        .post_json("/api/auth/god-mode", &json!({ "enabled": true }), Some(&root_token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let god_token = access_token(response).await?;

    let me: Value = read_json(app.get("/api/auth/me", Some(&god_token)).await?).await?;
    assert_eq!(me["user"]["god_mode"], true);
    assert_eq!(me["impersonating"], false);

    app.cleanup().await?;
    Ok(())
}
