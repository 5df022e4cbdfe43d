use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::core::CoreError;
use crate::models::{AddPhotoRequest, PhotosResponse};
use crate::routes::auth::AuthUser;
use crate::routes::error::validation_failed;
use crate::routes::AppState;
use crate::services::Store;

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/users/me/photos", web::get().to(list_photos::<S>))
        .route("/users/me/photos", web::post().to(add_photo::<S>))
        .route("/users/me/photos/{photo_id}/primary", web::put().to(set_primary::<S>))
        .route("/users/me/photos/{photo_id}", web::delete().to(delete_photo::<S>));
}

/// GET /api/v1/users/me/photos
async fn list_photos<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let photos = state.photos.list(user.id()).await?;
    Ok(HttpResponse::Ok().json(PhotosResponse {
        count: photos.len(),
        photos,
    }))
}

/// Attach an already uploaded photo to the caller's profile
///
/// POST /api/v1/users/me/photos
///
/// Request body:
/// ```json
/// { "url": "https://cdn.example.com/photo.jpg" }
/// ```
async fn add_photo<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<AddPhotoRequest>,
) -> Result<HttpResponse, CoreError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(&errors));
    }

    let photo = state.photos.add(user.id(), &req.url).await?;
    Ok(HttpResponse::Created().json(photo))
}

/// PUT /api/v1/users/me/photos/{photo_id}/primary
async fn set_primary<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    let photo = state.photos.set_primary(user.id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(photo))
}

/// DELETE /api/v1/users/me/photos/{photo_id}
async fn delete_photo<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    state.photos.delete(user.id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
