mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp, FAKE_XERO_INVOICE_ID};
use serde_json::{json, Value};

const PASSWORD: &str = "correct-horse";

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn editor_and_quick_invoices_price_the_same_line_differently() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    let token = app.login_token("owner@acme.test", PASSWORD).await?;

    let line = json!({ "name": "Labour", "quantity": 10, "price": 100, "tax_percent": 10 });

    let response = app
        .post_json("/api/invoices", &json!({ "line_items": [line] }), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let full: Value = read_json(response).await?;
    assert_eq!(full["invoice_number"], "INV-00001");
    assert_eq!(full["total"].as_f64(), Some(1100.0));
    assert_eq!(full["tax_total"].as_f64(), Some(100.0));
    assert_eq!(full["line_items"][0]["total"].as_f64(), Some(1100.0));
    assert_eq!(full["line_items"][0]["calculation_mode"], "full");

    let response = app
        .post_json(
            "/api/invoices/quick",
            &json!({ "line_items": [line] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let quick: Value = read_json(response).await?;
    assert_eq!(quick["invoice_number"], "INV-00002");
    assert_eq!(quick["total"].as_f64(), Some(1000.0));
    assert_eq!(quick["line_items"][0]["calculation_mode"], "simple");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn updating_line_items_recomputes_totals() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    let token = app.login_token("owner@acme.test", PASSWORD).await?;

    let invoice: Value = read_json(
        app.post_json("/api/invoices", &json!({}), Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(invoice["total"].as_f64(), Some(0.0));
    let invoice_id = id_of(&invoice);

    let response = app
        .put_json(
            &format!("/api/invoices/{invoice_id}"),
            &json!({
                "payment_status": "partially_paid",
                "line_items": [
                    { "name": "Parts", "quantity": 2, "price": 100, "discount_percent": 25, "tax_percent": 10 },
                    { "name": "Callout", "quantity": 1, "price": 80, "markup_percent": 50 }
                ]
            }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = read_json(response).await?;
    assert_eq!(updated["payment_status"], "partially_paid");
    assert_eq!(updated["subtotal"].as_f64(), Some(280.0));
    assert_eq!(updated["discount_total"].as_f64(), Some(50.0));
    assert_eq!(updated["tax_total"].as_f64(), Some(15.0));
    assert_eq!(updated["total"].as_f64(), Some(245.0));
    assert_eq!(updated["line_items"].as_array().map(Vec::len), Some(2));

    let response = app
        .put_json(
            &format!("/api/invoices/{invoice_id}"),
            &json!({ "line_items": [{ "name": "Bad", "quantity": 1, "price": 10, "tax_percent": 150 }] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .put_json(
            &format!("/api/invoices/{invoice_id}"),
            &json!({ "invoice_type": "PAID" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn catalog_items_are_added_with_the_simple_formula() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    let token = app.login_token("owner@acme.test", PASSWORD).await?;

    let catalog: Value = read_json(
        app.post_json("/api/catalogs", &json!({ "name": "Standard rates" }), Some(&token))
            .await?,
    )
    .await?;
    let catalog_id = id_of(&catalog);

    let response = app
        .post_json(
            &format!("/api/catalogs/{catalog_id}/items"),
            &json!({ "name": "Tap washer", "unit": "each", "cost": 20, "price": 50, "tax_percent": 10 }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let item: Value = read_json(response).await?;

    let invoice: Value = read_json(
        app.post_json(
            "/api/invoices",
            &json!({ "line_items": [{ "name": "Labour", "quantity": 1, "price": 100, "tax_percent": 10 }] }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    let invoice_id = id_of(&invoice);

    let response = app
        .post_json(
            &format!("/api/invoices/{invoice_id}/catalog-items"),
            &json!({ "catalog_item_id": item["id"], "quantity": 2 }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let updated: Value = read_json(response).await?;
    assert_eq!(updated["line_items"][1]["name"], "Tap washer");
    assert_eq!(updated["line_items"][1]["position"], 2);
    assert_eq!(updated["line_items"][1]["total"].as_f64(), Some(100.0));
    assert_eq!(updated["total"].as_f64(), Some(210.0));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn staff_cannot_touch_invoices() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "staff@acme.test", PASSWORD, "staff")
        .await?;
    let token = app.login_token("staff@acme.test", PASSWORD).await?;

    let response = app.get("/api/invoices", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app
        .post_json("/api/invoices", &json!({}), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn xero_sync_records_the_remote_invoice() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    let token = app.login_token("owner@acme.test", PASSWORD).await?;

    let customer: Value = read_json(
        app.post_json("/api/customers", &json!({ "name": "Jane Homeowner" }), Some(&token))
            .await?,
    )
    .await?;

    let invoice: Value = read_json(
        app.post_json(
            "/api/invoices",
            &json!({
                "customer_id": customer["id"],
                "invoice_type": "APPROVED",
                "line_items": [{ "name": "Labour", "quantity": 3, "price": 90 }]
            }),
            Some(&token),
        )
        .await?,
    )
    .await?;
    let invoice_id = id_of(&invoice);

    let response = app
        .post_json(
            &format!("/api/invoices/{invoice_id}/xero-sync"),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let synced: Value = read_json(response).await?;
    assert_eq!(synced["xero_invoice_id"], FAKE_XERO_INVOICE_ID);
    assert!(synced["xero_synced_at"].is_string());
    assert!(synced["xero_sync_error"].is_null());

    let Some(fake) = app.accounting() else {
        anyhow::bail!("test app was built without the fake accounting sync");
    };
    let pushed = fake.pushed().await;
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].status, "AUTHORISED");
    assert_eq!(pushed[0].contact.name, "Jane Homeowner");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn xero_sync_requires_configuration() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new_without_accounting().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    let token = app.login_token("owner@acme.test", PASSWORD).await?;

    let invoice: Value = read_json(
        app.post_json("/api/invoices", &json!({}), Some(&token))
            .await?,
    )
    .await?;

    let response = app
        .post_json(
            &format!("/api/invoices/{}/xero-sync", id_of(&invoice)),
            &json!({}),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn numbering_continues_after_an_earlier_invoice_is_deleted() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let company = app.insert_company("Acme Plumbing").await?;
    app.insert_user(company, "owner@acme.test", PASSWORD, "owner")
        .await?;
    let token = app.login_token("owner@acme.test", PASSWORD).await?;

    let first: Value = read_json(
        app.post_json("/api/invoices", &json!({}), Some(&token))
            .await?,
    )
    .await?;
    let second: Value = read_json(
        app.post_json("/api/invoices", &json!({}), Some(&token))
            .await?,
    )
    .await?;
    assert_eq!(second["invoice_number"], "INV-00002");

    let response = app
        .delete(&format!("/api/invoices/{}", id_of(&first)), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .post_json("/api/invoices", &json!({}), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let third: Value = read_json(response).await?;
    assert_eq!(third["invoice_number"], "INV-00003");

    let response = app
        .post_json(
            "/api/invoices/quick",
            &json!({ "line_items": [{ "name": "Callout", "quantity": 1, "price": 80 }] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let quick: Value = read_json(response).await?;
    assert_eq!(quick["invoice_number"], "INV-00004");

    app.cleanup().await?;
    Ok(())
}
