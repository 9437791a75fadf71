//! Registration routes
//!
//! The form is submitted as a flat JSON object of element names to values,
//! e.g. `{"name": "jane", "entity_main[profile_fullname][0][value]": "Jane Doe"}`.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::{Created, DataResponse};
use crate::app::AppState;
use crate::domain::profiles::ProfileResponse;
use crate::domain::{Account, FormInput};
use crate::error::{ApiError, ProfileError};
use crate::routes::profiles::profile_response;
use crate::services::registration::REGISTRATION_SUCCESSFUL;
use crate::services::RegistrationOutcome;

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub message: String,
    pub account: Account,
    pub profiles: Vec<ProfileResponse>,
}

/// GET /user/register
pub async fn registration_form(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let form = state.services.registration.describe_form().await?;
    Ok(DataResponse::new(form))
}

/// POST /user/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<FormInput>,
) -> Result<impl IntoResponse, ApiError> {
    match state.services.registration.submit(input).await? {
        RegistrationOutcome::Registered { account, profiles } => {
            let store = &state.services.profiles;
            let mut data = Vec::with_capacity(profiles.len());
            for profile in profiles {
                data.push(profile_response(store, profile).await?);
            }
            Ok(Created(DataResponse::new(RegistrationResponse {
                message: REGISTRATION_SUCCESSFUL.to_string(),
                account,
                profiles: data,
            })))
        }
        // Nothing was created
        RegistrationOutcome::Rejected { errors } => Err(ProfileError::Validation(errors).into()),
    }
}
