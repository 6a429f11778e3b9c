pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // auth
        .route("/api/auth/otp", post(handlers::auth::request_otp))
        .route("/api/auth/verify", post(handlers::auth::verify_otp))
        .route("/api/auth/logout", post(handlers::auth::logout))
        // reference data + blog
        .route("/api/plans", get(handlers::public::list_plans))
        .route("/api/jobs", get(handlers::public::list_jobs))
        .route("/api/blog", get(handlers::public::list_blog_posts))
        .route("/api/blog/:slug", get(handlers::public::get_blog_post))
        // customer token flow
        .route(
            "/api/customer-booking/:token",
            get(handlers::customer_booking::view_booking),
        )
        .route(
            "/api/customer-booking/:token/cancel",
            post(handlers::customer_booking::cancel_booking),
        )
        .route(
            "/api/customer-booking/:token/reschedule",
            post(handlers::customer_booking::reschedule_booking),
        )
        .route(
            "/api/customer-booking/:token/slots",
            get(handlers::customer_booking::free_slots),
        )
        .route(
            "/api/customer-booking/:token/ics",
            get(handlers::calendar::download_ics),
        )
        // business owner dashboard
        .route("/api/client/me", get(handlers::client::me))
        .route("/api/client/settings", post(handlers::client::update_settings))
        .route("/api/client/stats", get(handlers::client::stats))
        .route(
            "/api/client/bookings",
            get(handlers::client::list_bookings).post(handlers::client::create_booking),
        )
        .route(
            "/api/client/bookings/:id",
            get(handlers::client::get_booking)
                .put(handlers::client::update_booking)
                .delete(handlers::client::delete_booking),
        )
        .route(
            "/api/client/bookings/:id/cancel",
            post(handlers::client::cancel_booking),
        )
        .route("/api/client/availability", get(handlers::client::free_slots))
        .route("/api/client/customers", get(handlers::customers::list_customers))
        .route(
            "/api/client/customers/:id",
            post(handlers::customers::update_customer).delete(handlers::customers::delete_customer),
        )
        .route(
            "/api/client/customers/:id/block",
            post(handlers::customers::block_customer),
        )
        .route(
            "/api/client/customers/:id/unblock",
            post(handlers::customers::unblock_customer),
        )
        .route("/api/client/sms/logs", get(handlers::sms::list_logs))
        .route(
            "/api/client/sms/purchases",
            get(handlers::sms::list_purchases).post(handlers::sms::request_purchase),
        )
        .route("/api/client/events", get(handlers::events::events_stream))
        // platform admin
        .route("/api/admin/stats", get(handlers::admin::get_stats))
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route(
            "/api/admin/users/:id",
            get(handlers::admin::get_user)
                .post(handlers::admin::update_user)
                .delete(handlers::admin::delete_user),
        )
        .route("/api/admin/users/:id/plan", post(handlers::admin::activate_plan))
        .route(
            "/api/admin/jobs",
            get(handlers::admin::list_jobs).post(handlers::admin::create_job),
        )
        .route(
            "/api/admin/jobs/:id",
            post(handlers::admin::update_job).delete(handlers::admin::delete_job),
        )
        .route(
            "/api/admin/plans",
            get(handlers::admin::list_plans).post(handlers::admin::save_plan),
        )
        .route("/api/admin/plans/:key", axum::routing::delete(handlers::admin::delete_plan))
        .route("/api/admin/sms-templates", get(handlers::admin::list_sms_templates))
        .route(
            "/api/admin/sms-templates/:key",
            post(handlers::admin::update_sms_template),
        )
        .route("/api/admin/sms-logs", get(handlers::admin::list_sms_logs))
        .route("/api/admin/sms-purchases", get(handlers::admin::list_sms_purchases))
        .route(
            "/api/admin/sms-purchases/:id/approve",
            post(handlers::admin::approve_sms_purchase),
        )
        .route(
            "/api/admin/sms-purchases/:id/reject",
            post(handlers::admin::reject_sms_purchase),
        )
        .route(
            "/api/admin/blog",
            get(handlers::admin::list_blog_posts).post(handlers::admin::create_blog_post),
        )
        .route(
            "/api/admin/blog/:id",
            post(handlers::admin::update_blog_post).delete(handlers::admin::delete_blog_post),
        )
        // provider callbacks
        .route("/webhook/sms/delivery", post(handlers::webhook::sms_delivery))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
