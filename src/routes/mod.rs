pub mod accounts;
pub mod health;
pub mod profile_types;
pub mod profiles;
pub mod registration;

use axum::{routing::get, routing::post, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        // Profile types and their fields
        .route(
            "/profile-types",
            get(profile_types::list_types).post(profile_types::create_type),
        )
        .route(
            "/profile-types/:type_id",
            get(profile_types::get_type)
                .put(profile_types::save_type)
                .delete(profile_types::delete_type),
        )
        .route(
            "/profile-types/:type_id/fields",
            get(profile_types::list_fields).post(profile_types::attach_field),
        )
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route(
            "/accounts/:uid",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        .route("/accounts/:uid/profiles", get(accounts::list_account_profiles))
        // Profiles
        .route("/profiles", post(profiles::create_profile))
        .route(
            "/profiles/:profile_id",
            get(profiles::get_profile)
                .put(profiles::update_profile)
                .delete(profiles::delete_profile),
        )
        // Registration
        .route(
            "/user/register",
            get(registration::registration_form).post(registration::register),
        )
}
