use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_XERO_API_BASE: &str = "https://api.xero.com/api.xro/2.0";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub refresh_cookie_secure: bool,
    pub refresh_cookie_domain: Option<String>,
    pub cors_allowed_origin: Option<String>,
    pub upload_dir: PathBuf,
    pub max_avatar_bytes: usize,
    pub xero: Option<XeroConfig>,
}

#[derive(Clone, Debug)]
pub struct XeroConfig {
    pub api_base: String,
    pub access_token: String,
    pub tenant_id: String,
    pub sales_account_code: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "fieldbook".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "fieldbook-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let refresh_token_expiry_days = env::var("REFRESH_TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("REFRESH_TOKEN_EXPIRY_DAYS must be an integer")?;
        let refresh_cookie_secure = env::var("REFRESH_COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let refresh_cookie_domain = env::var("REFRESH_COOKIE_DOMAIN").ok();
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));
        let max_avatar_bytes = match env::var("MAX_AVATAR_BYTES") {
            Ok(value) => value
                .parse()
                .context("MAX_AVATAR_BYTES must be a positive integer")?,
            Err(_) => DEFAULT_MAX_AVATAR_BYTES,
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            refresh_token_expiry_days,
            refresh_cookie_secure,
            refresh_cookie_domain,
            cors_allowed_origin,
            upload_dir,
            max_avatar_bytes,
            xero: xero_from_env(),
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn xero_from_env() -> Option<XeroConfig> {
    let access_token = env::var("XERO_ACCESS_TOKEN").ok()?;
    let tenant_id = env::var("XERO_TENANT_ID").ok()?;
    build_xero_config(
        env::var("XERO_API_BASE").ok(),
        access_token,
        tenant_id,
        env::var("XERO_SALES_ACCOUNT_CODE").ok(),
    )
}

fn build_xero_config(
    api_base: Option<String>,
    access_token: String,
    tenant_id: String,
    sales_account_code: Option<String>,
) -> Option<XeroConfig> {
    if access_token.trim().is_empty() || tenant_id.trim().is_empty() {
        return None;
    }

    Some(XeroConfig {
        api_base: api_base
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_XERO_API_BASE.to_string()),
        access_token,
        tenant_id,
        sales_account_code: sales_account_code.unwrap_or_else(|| "200".to_string()),
    })
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
