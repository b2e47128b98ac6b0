mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde_json::{json, Value};

const PASSWORD: &str = "correct-horse";

#[tokio::test]
async fn admins_manage_users_of_their_company() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    let admin = app
        .insert_user(company, "admin@acme.test", PASSWORD, "admin")
        .await?;
    app.insert_user(company, "staff@acme.test", PASSWORD, "staff")
        .await?;
    let token = app.login_token("admin@acme.test", PASSWORD).await?;
    let staff_token = app.login_token("staff@acme.test", PASSWORD).await?;

    let response = app.get("/api/users", Some(&staff_token)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/users",
            &json!({ "email": "new@acme.test", "password": "short" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/users",
            &json!({ "email": "STAFF@acme.test", "password": PASSWORD }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/users",
            &json!({ "email": "root@acme.test", "password": PASSWORD, "role": "superadmin" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/users",
            &json!({ "email": "New@Acme.test", "password": PASSWORD, "first_name": "Nia" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = read_json(response).await?;
    assert_eq!(created["email"], "new@acme.test");
    assert_eq!(created["role"], "staff");
    assert_eq!(created["company_id"], json!(company));
    assert!(created.get("password_hash").is_none());
    let created_id = created["id"].as_str().unwrap_or_default().to_string();

    app.login_token("new@acme.test", PASSWORD).await?;

    let listed: Vec<Value> = read_json(app.get("/api/users", Some(&token)).await?).await?;
    assert_eq!(listed.len(), 3);

    let response = app
        .delete(&format!("/api/users/{admin}"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .delete(&format!("/api/users/{created_id}"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn admins_cannot_take_over_the_owner_account() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    let owner = app
        .insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    app.insert_user(company, "admin@acme.test", PASSWORD, "admin")
        .await?;
    let admin_token = app.login_token("admin@acme.test", PASSWORD).await?;

    let response = app
        .put_json(
            &format!("/api/users/{owner}"),
            &json!({ "password": "chosen-by-admin", "role": "staff" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .put_json(
            &format!("/api/users/{owner}"),
            &json!({ "email": "admin-controlled@acme.test" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .delete(&format!("/api/users/{owner}"), Some(&admin_token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "owner@acme.test", "password": "chosen-by-admin" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let owner_token = app.login_token("owner@acme.test", PASSWORD).await?;
    let me: Value = read_json(app.get("/api/auth/me", Some(&owner_token)).await?).await?;
    assert_eq!(me["user"]["role"], "owner");
    assert_eq!(me["user"]["email"], "owner@acme.test");

    app.cleanup().await?;
    Ok(())
}
