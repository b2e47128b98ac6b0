use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use fieldbook::auth::{jwt::JwtService, password};
use fieldbook::config::AppConfig;
use fieldbook::db::{self, PgPool};
use fieldbook::models::{NewCompany, NewCompanyAccess, NewUser};
use fieldbook::routes;
use fieldbook::schema::{companies, company_access, users};
use fieldbook::state::AppState;
use fieldbook::storage::AvatarStorage;
use fieldbook::xero::{AccountingSync, SyncError, XeroInvoice};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const FAKE_XERO_INVOICE_ID: &str = "xero-inv-0001";

#[derive(Default)]
pub struct FakeAvatarStorage {
    files: Mutex<Vec<String>>,
}

#[async_trait]
impl AvatarStorage for FakeAvatarStorage {
    async fn save(&self, file_name: &str, _bytes: Vec<u8>) -> Result<()> {
        self.files.lock().await.push(file_name.to_string());
        Ok(())
    }

    async fn delete(&self, file_name: &str) -> Result<()> {
        self.files.lock().await.retain(|name| name != file_name);
        Ok(())
    }
}

impl FakeAvatarStorage {
    #[allow(dead_code)]
    pub async fn files(&self) -> Vec<String> {
        self.files.lock().await.clone()
    }
}

#[derive(Default)]
pub struct FakeAccounting {
    pushed: Mutex<Vec<XeroInvoice>>,
}

#[async_trait]
impl AccountingSync for FakeAccounting {
    async fn push_invoice(&self, invoice: &XeroInvoice) -> Result<String, SyncError> {
        self.pushed.lock().await.push(invoice.clone());
        Ok(FAKE_XERO_INVOICE_ID.to_string())
    }

    fn account_code(&self) -> &str {
        "200"
    }
}

impl FakeAccounting {
    #[allow(dead_code)]
    pub async fn pushed(&self) -> Vec<XeroInvoice> {
        self.pushed.lock().await.clone()
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    avatars: Arc<FakeAvatarStorage>,
    accounting: Option<Arc<FakeAccounting>>,
}

impl TestApp {
    /// `None` when `TEST_DATABASE_URL` is not set.
    pub async fn try_new() -> Result<Option<Self>> {
        Self::build(true).await
    }

    #[allow(dead_code)]
    pub async fn try_new_without_accounting() -> Result<Option<Self>> {
        Self::build(false).await
    }

    async fn build(with_accounting: bool) -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping database flow");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            upload_dir: env::temp_dir().join("fieldbook-tests"),
            max_avatar_bytes: 1024,
            xero: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let avatars = Arc::new(FakeAvatarStorage::default());
        let avatars_for_state: Arc<dyn AvatarStorage> = avatars.clone();
        let accounting = with_accounting.then(|| Arc::new(FakeAccounting::default()));
        let accounting_for_state = accounting
            .clone()
            .map(|fake| fake as Arc<dyn AccountingSync>);
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            avatars_for_state,
            accounting_for_state,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            avatars,
            accounting,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    #[allow(dead_code)]
    pub fn avatars(&self) -> Arc<FakeAvatarStorage> {
        self.avatars.clone()
    }

    #[allow(dead_code)]
    pub fn accounting(&self) -> Option<Arc<FakeAccounting>> {
        self.accounting.clone()
    }

    pub async fn insert_company(&self, name: &str) -> Result<Uuid> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let company = NewCompany {
                id: Uuid::new_v4(),
                name,
            };
            diesel::insert_into(companies::table)
                .values(&company)
                .execute(conn)
                .context("failed to insert company")?;
            Ok(company.id)
        })
        .await
    }

    pub async fn insert_user(
        &self,
        company_id: Uuid,
        email: &str,
        raw_password: &str,
        role: &str,
    ) -> Result<Uuid> {
        let email = email.to_string();
        let raw_password = raw_password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                company_id,
                email,
                password_hash: password::hash_password(&raw_password)?,
                role,
                first_name: None,
                last_name: None,
                phone: None,
            };
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn grant_access(&self, user_id: Uuid, company_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(company_access::table)
                .values(&NewCompanyAccess {
                    user_id,
                    company_id,
                })
                .execute(conn)
                .context("failed to grant company access")?;
            Ok(())
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn user_avatar(&self, user_id: Uuid) -> Result<Option<String>> {
        self.with_conn(move |conn| {
            users::table
                .find(user_id)
                .select(users::avatar_url)
                .first(conn)
                .context("failed to load avatar url")
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );
        access_token(response).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body))?).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::DELETE).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    #[allow(dead_code)]
    pub async fn upload_avatar(
        &self,
        filename: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"avatar\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/profile/avatar")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| anyhow!("router error: {err}"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).context("response body was not the expected JSON")
}

/// Extracts `access_token` from a login, switch-company or god-mode response.
pub async fn access_token(response: hyper::Response<Body>) -> Result<String> {
    #[derive(serde::Deserialize)]
    struct TokenResponse {
        access_token: String,
    }
    let parsed: TokenResponse = read_json(response).await?;
    Ok(parsed.access_token)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE invoice_line_items, invoices, tasks, jobs, customers, \
         service_catalog_items, service_catalogs, refresh_tokens, company_access, users, companies \
         RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
