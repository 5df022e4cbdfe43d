use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::core::CoreError;
use crate::models::{DecisionRequest, DecisionResponse, MatchStateResponse, MatchSummary, MatchesResponse};
use crate::routes::auth::AuthUser;
use crate::routes::AppState;
use crate::services::Store;

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/decisions", web::post().to(record_decision::<S>))
        .route("/matches", web::get().to(list_matches::<S>))
        .route("/matches/{match_id}/state", web::get().to(match_state::<S>));
}

/// Record a like, super-like or pass
///
/// POST /api/v1/decisions
///
/// Request body:
/// ```json
/// {
///   "targetUserId": "uuid",
///   "like": true,
///   "super": false
/// }
/// ```
async fn record_decision<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<DecisionRequest>,
) -> Result<HttpResponse, CoreError> {
    let result = state
        .resolver
        .record_decision(user.id(), req.target_user_id, req.like, req.is_super)
        .await?;

    tracing::info!(
        "Decision {} -> {}: {:?} (matched: {})",
        user.id(),
        req.target_user_id,
        result.decision.kind(),
        result.matched
    );

    let mut status = if result.matched {
        HttpResponse::Created()
    } else {
        HttpResponse::Ok()
    };

    Ok(status.json(DecisionResponse {
        match_id: result.match_record.as_ref().map(|m| m.id),
        matched: result.matched,
        decision: result.decision,
    }))
}

/// Matches of the caller, newest first
///
/// GET /api/v1/matches
async fn list_matches<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let listed = state.resolver.matches_for(user.id()).await?;

    let matches: Vec<MatchSummary> = listed
        .into_iter()
        .filter_map(|entry| {
            let counterpart_id = entry.record.counterpart(user.id())?;
            Some(MatchSummary {
                id: entry.record.id,
                counterpart_id,
                created_at: entry.record.created_at,
                last_message_at: entry.record.last_message_at,
                message_count: entry.message_count,
                state: state.gate.state(&entry.record),
                last_message: entry.last_message,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(MatchesResponse {
        count: matches.len(),
        matches,
    }))
}

/// Messaging state of a match
///
/// GET /api/v1/matches/{match_id}/state
async fn match_state<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    let match_id = path.into_inner();

    let match_state = state.gate.match_state(match_id, user.id()).await?;
    let can_send_first_message = state.gate.can_send_first_message(match_id, user.id()).await?;

    Ok(HttpResponse::Ok().json(MatchStateResponse {
        match_id,
        state: match_state,
        can_send_first_message,
    }))
}
