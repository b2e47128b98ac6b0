use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use fieldbook::{
    auth::password,
    config::AppConfig,
    db,
    models::{NewCompany, NewUser},
    permissions::Role,
    schema::{companies, users},
    utils::validation::normalize_email,
};

const USAGE: &str = "Usage:\n  maintenance migrate\n  maintenance seed <company name> <owner email> <owner password>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("migrate") => migrate(),
        Some("seed") => match &args[1..] {
            [company, email, password] => seed(company, email, password),
            _ => bail!("seed expects three arguments\n{USAGE}"),
        },
        Some(cmd) => bail!("unknown command: {cmd}\n{USAGE}"),
        None => bail!("{USAGE}"),
    }
}

fn connect() -> Result<(AppConfig, PgConnection)> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let conn = PgConnection::establish(&config.database_url)
        .context("failed to connect to the database")?;
    Ok((config, conn))
}

fn migrate() -> Result<()> {
    let (_, mut conn) = connect()?;
    let applied = db::run_migrations(&mut conn)?;
    if applied.is_empty() {
        println!("Database is up to date.");
    } else {
        for version in &applied {
            println!("Applied {version}");
        }
    }
    Ok(())
}

fn seed(company_name: &str, email: &str, raw_password: &str) -> Result<()> {
    let company_name = company_name.trim();
    if company_name.is_empty() {
        bail!("company name must not be empty");
    }
    let email = normalize_email(email).map_err(anyhow::Error::msg)?;
    password::validate_new_password(raw_password).map_err(anyhow::Error::msg)?;
    let password_hash = password::hash_password(raw_password)?;

    let (_, mut conn) = connect()?;
    db::run_migrations(&mut conn)?;

    let taken: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::email.eq(&email)),
    ))
    .get_result(&mut conn)?;
    if taken {
        bail!("a user with email {email} already exists");
    }

    let company_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(companies::table)
            .values(&NewCompany {
                id: company_id,
                name: company_name.to_string(),
            })
            .execute(conn)?;
        diesel::insert_into(users::table)
            .values(&NewUser {
                id: user_id,
                company_id,
                email: email.clone(),
                password_hash,
                role: Role::Owner.as_str().to_string(),
                first_name: None,
                last_name: None,
                phone: None,
            })
            .execute(conn)?;
        Ok(())
    })
    .context("failed to seed company")?;

    tracing::info!(%company_id, %user_id, "seeded company and owner");
    println!("Created company {company_name} ({company_id}) with owner {email}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
