//! Profile type routes
//!
//! Administrative endpoints for profile types and the fields bound to them.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::domain::fields::AttachFieldRequest;
use crate::domain::profile_types::UpdateProfileTypeRequest;
use crate::domain::ProfileType;
use crate::error::ApiError;

/// GET /profile-types
pub async fn list_types(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let types = state.services.registry.list().await?;
    Ok(DataResponse::new(types))
}

/// POST /profile-types
pub async fn create_type(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProfileType>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(type_id = %req.id, "Creating profile type");
    let created = state.services.registry.create(req).await?;
    Ok(Created(DataResponse::new(created)))
}

/// GET /profile-types/:type_id
pub async fn get_type(
    State(state): State<Arc<AppState>>,
    Path(type_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let profile_type = state.services.registry.load(&type_id).await?;
    Ok(DataResponse::new(profile_type))
}

/// PUT /profile-types/:type_id
///
/// Updates an existing type; unknown ids are created with the given label.
pub async fn save_type(
    State(state): State<Arc<AppState>>,
    Path(type_id): Path<String>,
    Json(req): Json<UpdateProfileTypeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = &state.services.registry;
    let existing = registry.find(&type_id).await?;
    let mut profile_type = match existing {
        Some(existing) => existing,
        None => {
            let label = req
                .label
                .clone()
                .ok_or_else(|| ApiError::bad_request("label is required for a new profile type"))?;
            ProfileType::new(type_id, label)
        }
    };
    req.apply(&mut profile_type);

    registry.save(&profile_type).await?;
    Ok(DataResponse::new(profile_type))
}

/// DELETE /profile-types/:type_id
pub async fn delete_type(
    State(state): State<Arc<AppState>>,
    Path(type_id): Path<String>,
) -> Result<NoContent, ApiError> {
    state.services.registry.delete(&type_id).await?;
    Ok(NoContent)
}

/// GET /profile-types/:type_id/fields
pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    Path(type_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // 404 for an unknown type rather than an empty list
    state.services.registry.load(&type_id).await?;
    let fields = state.services.schema.definitions(&type_id).await?;
    Ok(DataResponse::new(fields))
}

/// POST /profile-types/:type_id/fields
pub async fn attach_field(
    State(state): State<Arc<AppState>>,
    Path(type_id): Path<String>,
    Json(req): Json<AttachFieldRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let definition = state
        .services
        .schema
        .attach_field(req.into_definition(type_id))
        .await?;
    Ok(Created(DataResponse::new(definition)))
}
