use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::error::EdgeError;
use crate::state::AppState;
use crate::state::UserInfo;

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub status: String,
    pub user: UserInfo,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub fact: String,
}

#[derive(Debug, Deserialize)]
struct FactPayload {
    fact: Option<String>,
}

pub async fn get_me(State(state): State<AppState>) -> Result<Json<MeResponse>, EdgeError> {
    let response = state.http.get(&*state.fact_url).send().await?;
    if !response.status().is_success() {
        info!(status = %response.status(), "fact request not successful");
    }

    let payload: FactPayload = response.json().await?;
    let Some(fact) = payload.fact.filter(|fact| !fact.is_empty()) else {
        info!("upstream returned no fact");
        return Err(EdgeError::MissingFact);
    };

    Ok(Json(MeResponse {
        status: "success".to_string(),
        user: UserInfo::clone(&state.user),
        timestamp: Utc::now().to_rfc3339(),
        fact,
    }))
}
