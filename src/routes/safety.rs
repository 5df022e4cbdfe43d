use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::core::{BlockResult, CoreError};
use crate::models::{BlockRequest, BlocksResponse, ReportRequest};
use crate::routes::auth::AuthUser;
use crate::routes::AppState;
use crate::services::Store;

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/blocks", web::post().to(block_user::<S>))
        .route("/blocks", web::get().to(list_blocks::<S>))
        .route("/blocks/{user_id}", web::delete().to(unblock_user::<S>))
        .route("/reports", web::post().to(report_user::<S>));
}

/// Block a user; repeats are accepted
///
/// POST /api/v1/blocks
///
/// Request body:
/// ```json
/// { "userId": "uuid" }
/// ```
async fn block_user<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<BlockRequest>,
) -> Result<HttpResponse, CoreError> {
    let result = state.safety.block(user.id(), req.user_id).await?;

    let response = match &result {
        BlockResult::Blocked { .. } => HttpResponse::Created().json(&result),
        BlockResult::AlreadyBlocked { .. } => HttpResponse::Ok().json(&result),
    };
    Ok(response)
}

/// DELETE /api/v1/blocks/{user_id}
async fn unblock_user<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    state.safety.unblock(user.id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/blocks
async fn list_blocks<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let blocks = state.safety.blocked_users(user.id()).await?;
    Ok(HttpResponse::Ok().json(BlocksResponse {
        count: blocks.len(),
        blocks,
    }))
}

/// Report a user
///
/// POST /api/v1/reports
///
/// Request body:
/// ```json
/// {
///   "userId": "uuid",
///   "reason": "spam|harassment|inappropriate_content|fake_profile|underage|other",
///   "description": "optional"
/// }
/// ```
async fn report_user<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<ReportRequest>,
) -> Result<HttpResponse, CoreError> {
    let req = req.into_inner();
    let result = state
        .safety
        .report(user.id(), req.user_id, req.reason, req.description)
        .await?;

    Ok(HttpResponse::Created().json(result))
}
