//! Account routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::domain::{AccountId, NewAccount};
use crate::error::ApiError;
use crate::routes::profiles::profile_response;

#[derive(Debug, Deserialize, Default)]
pub struct OwnerProfilesQuery {
    #[serde(rename = "type")]
    pub profile_type: Option<String>,
}

/// POST /accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewAccount>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.services.accounts.create(req).await?;
    Ok(Created(DataResponse::new(account)))
}

/// GET /accounts/:uid
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<AccountId>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.services.accounts.load(uid).await?;
    Ok(DataResponse::new(account))
}

/// DELETE /accounts/:uid
///
/// Removes the account together with all of its profiles.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<AccountId>,
) -> Result<NoContent, ApiError> {
    state.services.accounts.delete(uid).await?;
    Ok(NoContent)
}

/// GET /accounts/:uid/profiles
pub async fn list_account_profiles(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<AccountId>,
    Query(query): Query<OwnerProfilesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.services.accounts.load(uid).await?;

    let store = &state.services.profiles;
    let profiles = match query.profile_type.as_deref() {
        Some(profile_type) => store.load_by_owner_and_type(uid, profile_type).await?,
        None => store.load_by_owner(uid).await?,
    };

    let mut data = Vec::with_capacity(profiles.len());
    for profile in profiles {
        data.push(profile_response(store, profile).await?);
    }
    Ok(DataResponse::new(data))
}
