use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    session::{BridgeError, Payload, SessionContext},
    utils::success_to_api_response,
};

use super::SessionRoutesState;
use super::model::{LoginRequest, LogoutResponse, SessionResponse};

async fn describe(session: &SessionContext) -> SessionResponse {
    SessionResponse {
        active: session.token().await.is_some(),
        payload: session.payload().await,
        user: session.user().await,
    }
}

#[axum::debug_handler]
pub async fn current(session: SessionContext) -> impl IntoResponse {
    success_to_api_response(describe(&session).await)
}

/// Replaces the whole payload.
#[axum::debug_handler]
pub async fn replace_payload(
    session: SessionContext,
    Json(payload): Json<Payload>,
) -> impl IntoResponse {
    session.replace(payload).await;
    success_to_api_response(describe(&session).await)
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<SessionRoutesState>,
    session: SessionContext,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("user_id must not be empty".into()));
    }

    let Some(users) = &state.users else {
        return Err(AppError::Session(BridgeError::Configuration(
            "no user repository".into(),
        )));
    };

    let user = users
        .find(&req.user_id)
        .await
        .map_err(BridgeError::from)?
        .ok_or_else(|| AppError::NotFound(format!("user {}", req.user_id)))?;

    tracing::info!("User {} attached to session", user.id);
    session.set_user(Some(user)).await;
    Ok(success_to_api_response(describe(&session).await).into_response())
}

#[axum::debug_handler]
pub async fn logout(session: SessionContext) -> impl IntoResponse {
    let destroyed = session.token().await.is_some();
    session.destroy().await;
    success_to_api_response(LogoutResponse { destroyed })
}
