use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod catalogs;
pub mod companies;
pub mod customers;
pub mod health;
pub mod invoices;
pub mod jobs;
pub mod profile;
pub mod reports;
pub mod tasks;
pub mod users;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = %value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/switch-company", post(auth::switch_company))
        .route("/god-mode", post(auth::set_god_mode))
        .route_layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(
            state.clone(),
        ))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh));

    let profile_routes = Router::new()
        .route("/", get(profile::get_profile).put(profile::update_profile))
        .route("/password", post(profile::change_password))
        .route(
            "/avatar",
            post(profile::upload_avatar).delete(profile::delete_avatar),
        );

    let company_routes = Router::new()
        .route("/", get(companies::list_companies))
        .route(
            "/current",
            get(companies::get_current_company).put(companies::update_current_company),
        );

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id", put(users::update_user).delete(users::delete_user));

    let customer_routes = Router::new()
        .route(
            "/",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route(
            "/:id",
            get(customers::get_customer)
                .put(customers::update_customer)
                .delete(customers::delete_customer),
        );

    let job_routes = Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/:id",
            get(jobs::get_job)
                .put(jobs::update_job)
                .delete(jobs::delete_job),
        )
        .route("/:id/status", put(jobs::update_job_status));

    let invoice_routes = Router::new()
        .route(
            "/",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route("/quick", post(invoices::create_quick_invoice))
        .route(
            "/:id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/:id/catalog-items", post(invoices::add_catalog_item))
        .route("/:id/xero-sync", post(invoices::sync_to_xero));

    let catalog_routes = Router::new()
        .route(
            "/",
            get(catalogs::list_catalogs).post(catalogs::create_catalog),
        )
        .route(
            "/:id",
            get(catalogs::get_catalog)
                .put(catalogs::update_catalog)
                .delete(catalogs::delete_catalog),
        )
        .route("/:id/items", post(catalogs::create_catalog_item))
        .route(
            "/:id/items/:item_id",
            put(catalogs::update_catalog_item).delete(catalogs::delete_catalog_item),
        );

    let task_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/:id", put(tasks::update_task).delete(tasks::delete_task));

    let report_routes = Router::new().route("/phases", get(reports::phase_report));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/profile", profile_routes)
        .nest("/api/companies", company_routes)
        .nest("/api/users", user_routes)
        .nest("/api/customers", customer_routes)
        .nest("/api/jobs", job_routes)
        .nest("/api/invoices", invoice_routes)
        .nest("/api/catalogs", catalog_routes)
        .nest("/api/tasks", task_routes)
        .nest("/api/reports", report_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
