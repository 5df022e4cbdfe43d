use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::core::distance::is_valid_coordinates;
use crate::models::domain::{Coordinates, Gender, Preferences, ReportReason, MAX_AGE, MIN_AGE};

/// Query for the discovery queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverQuery {
    pub limit: Option<usize>,
}

/// Query for the nearby search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearbyQuery {
    /// Radius in km
    pub radius: Option<u16>,
}

/// Like, super-like or pass on a candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    #[serde(alias = "target_user_id", rename = "targetUserId")]
    pub target_user_id: Uuid,
    pub like: bool,
    #[serde(default, rename = "super")]
    pub is_super: bool,
}

/// Content is trimmed and length-checked by the messaging gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagesQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRequest {
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: Uuid,
}

/// Photo metadata; the upload itself happens elsewhere
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddPhotoRequest {
    #[validate(url, length(max = 2048))]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: Uuid,
    pub reason: ReportReason,
    #[serde(default)]
    pub description: Option<String>,
}

/// Replacement preference block
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_age_range"))]
pub struct PreferencesRequest {
    #[validate(range(min = 18, max = 99))]
    pub min_age: Option<u8>,
    #[validate(range(min = 18, max = 99))]
    pub max_age: Option<u8>,
    pub interested_in: Option<Gender>,
    #[validate(range(min = 1, max = 500))]
    #[serde(alias = "maxDistance")]
    pub max_distance_km: Option<u16>,
}

impl From<PreferencesRequest> for Preferences {
    fn from(req: PreferencesRequest) -> Self {
        Preferences {
            min_age: req.min_age,
            max_age: req.max_age,
            interested_in: req.interested_in,
            max_distance_km: req.max_distance_km,
        }
    }
}

fn validate_age_range(req: &PreferencesRequest) -> Result<(), ValidationError> {
    let min = req.min_age.unwrap_or(MIN_AGE);
    let max = req.max_age.unwrap_or(MAX_AGE);
    if min > max {
        return Err(ValidationError::new("min_age_above_max_age"));
    }
    Ok(())
}

/// Profile fields pushed by the profile service when a user signs up
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub gender: Gender,
    pub date_of_birth: NaiveDate,
    #[validate(nested)]
    #[serde(default)]
    pub location: Option<LocationRequest>,
    #[validate(nested)]
    #[serde(default)]
    pub preferences: Option<PreferencesRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_coordinates"))]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

fn validate_coordinates(req: &LocationRequest) -> Result<(), ValidationError> {
    let location = Coordinates {
        latitude: req.latitude,
        longitude: req.longitude,
    };
    if !is_valid_coordinates(location) {
        return Err(ValidationError::new("coordinates_out_of_range"));
    }
    Ok(())
}
