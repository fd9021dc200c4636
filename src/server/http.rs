//! HTTP handlers
//!
//! Response bodies keep the field names the SmartSkill frontend reads
//! (`success`, `message`, camelCase payloads).

use axum::{
    body::Bytes,
    extract::{Extension, Json, Path, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::auth::{self, Claims};
use super::error::{ApiError, ApiResult, JsonBody};
use super::ServerState;
use crate::scoring::{self, verify::MISSING_JUSTIFICATION, Justification, Verification};
use crate::store::NewUser;
use crate::tutor::content;
use crate::types::{AnswerRecord, ChatTurn};

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ============ Accounts ============

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

pub async fn register_handler(
    State(state): State<ServerState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(username), Some(email), Some(password)) =
        (required(req.username), required(req.email), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(ApiError::bad_request("Username, email and password are required"));
    };

    let password_hash = auth::hash_password(&password, state.config.auth.bcrypt_cost).await?;
    let user = state
        .store
        .create_user(NewUser {
            username,
            email,
            password_hash,
        })
        .await?;

    tracing::info!("Registered user {}", user.id);
    Ok(Json(json!({
        "success": true,
        "message": "User registered successfully",
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

pub async fn login_handler(
    State(state): State<ServerState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let (Some(email), Some(password)) = (required(req.email), req.password) else {
        return Err(ApiError::bad_request("Email and password are required"));
    };
    let identifier = email.to_lowercase();

    if let Some(remaining) = state.auth_state.is_locked(&identifier) {
        tracing::warn!("Login attempt for locked account {}", identifier);
        return Err(ApiError::TooManyRequests(format!(
            "Too many failed login attempts. Try again in {} minute(s).",
            remaining.num_minutes().max(1)
        )));
    }

    let user = state.store.find_user_by_email(&identifier).await?;
    let verified = match &user {
        Some(user) => auth::verify_password(&password, &user.password_hash).await?,
        None => state.auth_state.verify_decoy(&password).await?,
    };
    let user = match user {
        Some(user) if verified => user,
        _ => {
            state.auth_state.record_failed_login(&identifier);
            return Err(ApiError::bad_request("Invalid email or password"));
        }
    };

    state.auth_state.clear_login_attempts(&identifier);
    let tokens = state.auth_state.generate_pair(&user.id, &user.username)?;

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": tokens.access_token,
        "refreshToken": tokens.refresh_token,
        "expiresIn": tokens.expires_in,
        "username": user.username,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(alias = "refresh_token", rename = "refreshToken")]
    pub refresh_token: String,
}

pub async fn refresh_handler(
    State(state): State<ServerState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let (claims, tokens) = state.auth_state.rotate(&req.refresh_token).map_err(|e| {
        tracing::debug!("Refresh rejected: {:#}", e);
        ApiError::Unauthorized("Invalid refresh token".into())
    })?;

    Ok(Json(json!({
        "success": true,
        "token": tokens.access_token,
        "refreshToken": tokens.refresh_token,
        "expiresIn": tokens.expires_in,
        "username": claims.username,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// Revoke the token in the body, or the bearer token when the body has none
pub async fn logout_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let req: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request("Invalid request body"))?
    };

    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string);
    let token = required(req.token)
        .or(from_header)
        .ok_or_else(|| ApiError::bad_request("No token provided"))?;

    let jti = state
        .auth_state
        .extract_jti(&token)
        .map_err(|_| ApiError::Unauthorized("Invalid token".into()))?;
    state.auth_state.revoke_token(&jti);

    Ok(Json(json!({
        "success": true,
        "message": "Logged out",
    })))
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: Option<String>,
}

const RESET_LINK_SENT: &str = "If that email is registered, a password reset link has been sent.";

pub async fn forgot_password_handler(
    State(state): State<ServerState>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = required(req.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;

    match state.store.find_user_by_email(&email).await? {
        Some(user) => {
            let token = auth::generate_reset_token();
            let expires_at = Utc::now() + Duration::minutes(state.config.auth.reset_token_expiry_minutes);
            state.store.set_reset_token(&user.id, &token, expires_at).await?;

            let link = format!(
                "{}/reset-password/{}",
                state.config.server.frontend_url.trim_end_matches('/'),
                token
            );
            if let Err(e) = state.mailer.send_reset_link(&user.email, &link).await {
                tracing::error!("Failed to deliver reset link to {}: {:#}", user.email, e);
            }
        }
        None => tracing::debug!("Password reset requested for unknown email"),
    }

    Ok(Json(json!({
        "success": true,
        "message": RESET_LINK_SENT,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default, rename = "newPassword")]
    pub new_password: Option<String>,
}

pub async fn reset_password_handler(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let password = req
        .new_password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("New password is required"))?;

    let user = state
        .store
        .find_user_by_reset_token(&token, Utc::now())
        .await?
        .ok_or_else(|| ApiError::bad_request("Invalid or expired token"))?;

    let hash = auth::hash_password(&password, state.config.auth.bcrypt_cost).await?;
    state.store.update_password(&user.id, &hash).await?;
    state.auth_state.clear_login_attempts(&user.email);
    tracing::info!("Password reset for user {}", user.id);

    Ok(Json(json!({
        "success": true,
        "message": "Password reset successful",
    })))
}

// ============ Quiz ============

pub async fn questions_handler(State(state): State<ServerState>) -> ApiResult<impl IntoResponse> {
    let questions = state
        .store
        .sample_questions(state.config.quiz.questions_per_quiz)
        .await?;

    Ok(Json(json!({
        "success": true,
        "questions": questions,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, rename = "qId")]
    pub q_id: Option<String>,
    #[serde(default, rename = "selectedOption")]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub justification: Option<Justification>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(flatten)]
    pub verification: Verification,
}

pub async fn verify_answer_handler(
    State(state): State<ServerState>,
    JsonBody(req): JsonBody<VerifyRequest>,
) -> ApiResult<Json<VerifyResponse>> {
    let (Some(q_id), Some(selected)) = (
        required(req.q_id),
        req.selected_option.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing question ID or selection."));
    };

    let question = state
        .store
        .get_question(&q_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Question not found.".into()))?;

    let verification = scoring::verify_answer(
        &question,
        &selected,
        &req.justification.unwrap_or_default(),
        state.config.quiz.scoring_policy,
    );

    Ok(Json(VerifyResponse {
        success: true,
        verification,
    }))
}

// ============ Tutor ============

#[derive(Debug, Deserialize)]
pub struct TextPart {
    #[serde(default)]
    pub text: String,
}

/// A chat turn as sent by clients: either `{role, content}` or the
/// `{role, parts: [{text}]}` form
#[derive(Debug, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub parts: Vec<TextPart>,
}

impl HistoryMessage {
    pub fn into_turn(self) -> ChatTurn {
        let content = match self.content {
            Some(content) => content,
            None => self
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n"),
        };
        ChatTurn::new(self.role, content)
    }
}

#[derive(Debug, Deserialize)]
pub struct TutorRequest {
    #[serde(default, rename = "userQuery")]
    pub user_query: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

pub async fn tutor_handler(
    State(state): State<ServerState>,
    JsonBody(req): JsonBody<TutorRequest>,
) -> ApiResult<impl IntoResponse> {
    let query = required(req.user_query).ok_or_else(|| ApiError::bad_request("Missing user query"))?;
    let history: Vec<ChatTurn> = req.history.into_iter().map(HistoryMessage::into_turn).collect();

    let reply = state.tutor.reply(&query, &history).await?;

    Ok(Json(json!({
        "success": true,
        "predictedLevel": reply.predicted_level,
        "tutorResponse": reply.response,
    })))
}

/// One content-generation batch
pub async fn generate_content_handler(
    State(state): State<ServerState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!("Content generation requested by {}", claims.username);

    let outcome = content::process_batch(&state.store, &state.content, state.config.content.batch_size).await?;

    Ok(Json(json!({
        "success": true,
        "count": outcome.updated,
        "failed": outcome.failed,
        "message": format!("Generated content for {} question(s).", outcome.updated),
    })))
}

// ============ Dashboard ============

pub async fn progress_handler(
    State(state): State<ServerState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let progress = state.store.list_progress(&claims.sub).await?;
    let best_score = scoring::recommend::best_entry(&progress)
        .map(|p| p.score_percentage)
        .unwrap_or(0.0);
    let level = scoring::dashboard_level(&progress);

    Ok(Json(json!({
        "success": true,
        "progress": progress,
        "recommendedLevel": level,
        "bestScore": best_score,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SubmittedAnswer {
    #[serde(rename = "qId")]
    pub q_id: String,
    #[serde(default)]
    pub selected: String,
    #[serde(default, rename = "selectedJustification")]
    pub selected_justification: Option<Justification>,
}

#[derive(Debug, Deserialize)]
pub struct SaveProgressRequest {
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
}

/// Save a finished quiz. Every answer is re-scored against the stored
/// question, so client-side scores are never trusted.
pub async fn save_progress_handler(
    State(state): State<ServerState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<SaveProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.answers.is_empty() {
        return Err(ApiError::bad_request("No answers submitted"));
    }

    let mut records = Vec::with_capacity(req.answers.len());
    for answer in req.answers {
        let question = state
            .store
            .get_question(&answer.q_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Question not found: {}", answer.q_id)))?;

        let justification = answer.selected_justification.unwrap_or_default();
        let verification = scoring::verify_answer(
            &question,
            &answer.selected,
            &justification,
            state.config.quiz.scoring_policy,
        );

        records.push(AnswerRecord {
            q_id: answer.q_id,
            question: Some(question.question.clone()),
            selected: answer.selected,
            selected_justification: justification.as_text(),
            correct: verification.is_correct,
            is_justification_relevant: verification.is_justification_relevant(),
            total_score: verification.total_score,
            official_justification: Some(verification.official_justification)
                .filter(|j| j != MISSING_JUSTIFICATION),
            official_keywords: question.keywords,
            difficulty: question.difficulty_level,
        });
    }

    let entry = scoring::build_progress(records);
    state.store.append_progress(&claims.sub, &entry).await?;
    tracing::info!(
        "Saved quiz for {}: {:.1}% ({})",
        claims.username, entry.score_percentage, entry.recommended_level
    );

    Ok(Json(json!({
        "success": true,
        "message": "Progress saved",
        "progress": entry,
    })))
}

// ============ Status ============

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub name: String,
    pub version: String,
    pub questions: usize,
    pub tutor_model: String,
}

pub async fn status_handler(State(state): State<ServerState>) -> ApiResult<Json<StatusResponse>> {
    let questions = state.store.count_questions().await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        name: crate::NAME.to_string(),
        version: crate::VERSION.to_string(),
        questions,
        tutor_model: state.config.openrouter.default_model.clone(),
    }))
}
