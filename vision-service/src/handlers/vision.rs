use crate::services::orchestrator::MISSING_USER_ID;
use crate::startup::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// Query parameters of `GET /api/gemini_vision`.
#[derive(Debug, Default, PartialEq)]
pub struct VisionParams {
    pub user_id: Option<String>,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

impl VisionParams {
    /// Collect the known parameters from decoded query pairs. A repeated
    /// key keeps its first value; unknown keys are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "user_id" => &mut params.user_id,
                "text" => &mut params.text,
                "image_url" => &mut params.image_url,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisionResponse {
    pub response: String,
}

/// Send the user's text (and optional image) to the model, continuing
/// that user's conversation.
pub async fn gemini_vision(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<VisionResponse>, AppError> {
    let Query(pairs) =
        query.map_err(|rejection| AppError::BadRequest(anyhow::anyhow!(rejection.body_text())))?;
    let params = VisionParams::from_pairs(pairs);

    let user_id = params
        .user_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!(MISSING_USER_ID)))?;

    tracing::info!(
        user_id = %user_id,
        has_text = params.text.is_some(),
        has_image = params.image_url.is_some(),
        "Vision request"
    );

    let reply = state
        .orchestrator
        .handle(user_id, params.text.as_deref(), params.image_url.as_deref())
        .await?;

    Ok(Json(VisionResponse { response: reply }))
}
