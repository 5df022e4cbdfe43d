use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::core::CoreError;
use crate::models::{MessagesQuery, MessagesResponse, SendMessageRequest, UnreadResponse};
use crate::routes::auth::AuthUser;
use crate::routes::AppState;
use crate::services::Store;

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/matches/{match_id}/messages", web::post().to(send_message::<S>))
        .route("/matches/{match_id}/messages", web::get().to(list_messages::<S>))
        .route("/messages/unread", web::get().to(unread_count::<S>))
        .route("/messages/{message_id}/read", web::post().to(mark_read::<S>))
        .route("/messages/{message_id}", web::delete().to(delete_message::<S>));
}

/// Send a message through the messaging gate
///
/// POST /api/v1/matches/{match_id}/messages
///
/// Request body:
/// ```json
/// { "content": "string" }
/// ```
async fn send_message<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
    req: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, CoreError> {
    let message = state
        .gate
        .send_message(path.into_inner(), user.id(), &req.content)
        .await?;

    Ok(HttpResponse::Created().json(message))
}

/// Messages of a match, oldest first within the page
///
/// GET /api/v1/matches/{match_id}/messages?page=1&limit=50
async fn list_messages<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
    query: web::Query<MessagesQuery>,
) -> Result<HttpResponse, CoreError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(state.gate.policy().page_size);

    let messages = state
        .gate
        .list_messages(path.into_inner(), user.id(), Some(page), Some(limit))
        .await?;

    Ok(HttpResponse::Ok().json(MessagesResponse { messages, page, limit }))
}

/// POST /api/v1/messages/{message_id}/read
async fn mark_read<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    state.gate.mark_read(path.into_inner(), user.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/v1/messages/{message_id}
async fn delete_message<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    state.gate.delete_message(path.into_inner(), user.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/messages/unread
async fn unread_count<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let unread = state.gate.unread_count(user.id()).await?;
    Ok(HttpResponse::Ok().json(UnreadResponse { unread }))
}
