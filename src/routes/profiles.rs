//! Profile routes

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::domain::profiles::{CreateProfileRequest, ProfileResponse, UpdateProfileRequest};
use crate::domain::{Profile, ProfileId};
use crate::error::ApiError;
use crate::services::ProfileStore;

/// Response body of a persisted profile, with its live label.
pub(crate) async fn profile_response(store: &ProfileStore, profile: Profile) -> Result<ProfileResponse, ApiError> {
    let label = store.label(&profile).await?;
    ProfileResponse::from_profile(profile, Some(label))
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("profile has not been saved")))
}

/// POST /profiles
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = &state.services.profiles;
    let mut profile = store.create(req.profile_type, req.uid, req.fields);
    store.save(&mut profile).await?;

    Ok(Created(DataResponse::new(profile_response(store, profile).await?)))
}

/// GET /profiles/:profile_id
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<ProfileId>,
) -> Result<impl IntoResponse, ApiError> {
    let store = &state.services.profiles;
    let profile = store.load(profile_id).await?;
    Ok(DataResponse::new(profile_response(store, profile).await?))
}

/// PUT /profiles/:profile_id
///
/// Replaces the listed fields; an empty list clears a field.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<ProfileId>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = &state.services.profiles;
    let mut profile = store.load(profile_id).await?;
    for (name, values) in req.fields {
        if values.is_empty() {
            profile.clear_field(&name);
        } else {
            profile.set_field(name, values);
        }
    }
    store.save(&mut profile).await?;

    Ok(DataResponse::new(profile_response(store, profile).await?))
}

/// DELETE /profiles/:profile_id
pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<ProfileId>,
) -> Result<NoContent, ApiError> {
    if !state.services.profiles.delete_by_id(profile_id).await? {
        return Err(ApiError::not_found(format!("Profile {} not found", profile_id)));
    }
    Ok(NoContent)
}
