use actix_web::{web, HttpResponse};

use crate::core::CoreError;
use crate::models::{CandidateView, DiscoverQuery, DiscoverResponse, NearbyQuery};
use crate::routes::auth::AuthUser;
use crate::routes::AppState;
use crate::services::Store;

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/discover", web::get().to(discover::<S>))
        .route("/nearby", web::get().to(nearby::<S>));
}

/// Discovery queue
///
/// GET /api/v1/discover?limit=10
async fn discover<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    query: web::Query<DiscoverQuery>,
) -> Result<HttpResponse, CoreError> {
    let result = state.eligibility.get_candidates(user.id(), query.limit).await?;

    tracing::info!(
        "Returning {} candidates for user {} ({} scanned)",
        result.candidates.len(),
        user.id(),
        result.scanned
    );

    let candidates: Vec<CandidateView> = result.candidates.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(DiscoverResponse {
        count: candidates.len(),
        candidates,
    }))
}

/// Users within a radius, nearest first
///
/// GET /api/v1/nearby?radius=50
async fn nearby<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    query: web::Query<NearbyQuery>,
) -> Result<HttpResponse, CoreError> {
    let found = state.eligibility.nearby(user.id(), query.radius).await?;

    let candidates: Vec<CandidateView> = found.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(DiscoverResponse {
        count: candidates.len(),
        candidates,
    }))
}
