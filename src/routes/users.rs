use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::core::age::age_on;
use crate::core::CoreError;
use crate::models::{
    Coordinates, CreateProfileRequest, ErrorResponse, LocationRequest, Preferences,
    PreferencesRequest, User, MIN_AGE,
};
use crate::routes::auth::AuthUser;
use crate::routes::error::validation_failed;
use crate::routes::AppState;
use crate::services::{Store, StoreError};

pub fn configure<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.route("/users/me", web::get().to(get_profile::<S>))
        .route("/users/me", web::post().to(create_profile::<S>))
        .route("/users/me/preferences", web::put().to(update_preferences::<S>))
        .route("/users/me/location", web::put().to(update_location::<S>))
        .route("/users/me/activity", web::post().to(touch_activity::<S>));
}

/// GET /api/v1/users/me
async fn get_profile<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let profile = state
        .store
        .get_user(user.id())
        .await?
        .ok_or_else(|| CoreError::user_not_found(user.id()))?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Register the caller's profile with the engine
///
/// POST /api/v1/users/me
///
/// Request body:
/// ```json
/// {
///   "name": "string",
///   "gender": "female",
///   "dateOfBirth": "1995-04-12",
///   "location": { "latitude": 40.7, "longitude": -74.0 },
///   "preferences": { "minAge": 25, "maxAge": 35, "interestedIn": "male", "maxDistanceKm": 50 }
/// }
/// ```
async fn create_profile<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<CreateProfileRequest>,
) -> Result<HttpResponse, CoreError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(&errors));
    }

    let now = state.clock.now();
    let req = req.into_inner();
    if age_on(req.date_of_birth, now.date_naive()) < u32::from(MIN_AGE) {
        return Err(CoreError::invalid(format!("users must be at least {}", MIN_AGE)));
    }

    let profile = User {
        id: user.id(),
        name: req.name.trim().to_string(),
        gender: req.gender,
        date_of_birth: req.date_of_birth,
        location: req.location.map(|l| Coordinates {
            latitude: l.latitude,
            longitude: l.longitude,
        }),
        preferences: req.preferences.map(Preferences::from).unwrap_or_default(),
        last_active: now,
        is_blocked: false,
        created_at: now,
    };

    match state.store.insert_user(profile).await {
        Ok(created) => {
            tracing::info!("Registered profile for user {}", created.id);
            Ok(HttpResponse::Created().json(created))
        }
        Err(StoreError::Conflict(message)) => Ok(HttpResponse::Conflict().json(ErrorResponse {
            error: "profile_exists".to_string(),
            message,
            status_code: 409,
        })),
        Err(e) => Err(e.into()),
    }
}

/// Replace the caller's discovery preferences
///
/// PUT /api/v1/users/me/preferences
async fn update_preferences<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<PreferencesRequest>,
) -> Result<HttpResponse, CoreError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(&errors));
    }

    let preferences = Preferences::from(req.into_inner());
    if !state.store.update_preferences(user.id(), preferences.clone()).await? {
        return Err(CoreError::user_not_found(user.id()));
    }
    Ok(HttpResponse::Ok().json(preferences))
}

/// PUT /api/v1/users/me/location
async fn update_location<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
    req: web::Json<LocationRequest>,
) -> Result<HttpResponse, CoreError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(&errors));
    }
    let location = Coordinates {
        latitude: req.latitude,
        longitude: req.longitude,
    };
    if !state.store.update_location(user.id(), location).await? {
        return Err(CoreError::user_not_found(user.id()));
    }
    Ok(HttpResponse::NoContent().finish())
}

/// Activity ping; moves the caller up other users' discovery queues
///
/// POST /api/v1/users/me/activity
async fn touch_activity<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    if !state.store.touch_activity(user.id(), state.clock.now()).await? {
        return Err(CoreError::user_not_found(user.id()));
    }
    Ok(HttpResponse::NoContent().finish())
}
