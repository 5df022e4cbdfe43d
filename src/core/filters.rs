use chrono::NaiveDate;

use crate::core::age::{age_on, birth_window};
use crate::core::distance::{calculate_bounding_box, distance_km};
use crate::models::{CandidateQuery, Gender, User};

/// Check the candidate's gender against an `interestedIn` preference
#[inline]
pub fn matches_gender(candidate: &User, interested_in: Option<Gender>) -> bool {
    interested_in.map_or(true, |wanted| candidate.gender == wanted)
}

/// Check the candidate's age, in whole years on `today`, against inclusive bounds
#[inline]
pub fn within_age_range(candidate: &User, bounds: (u8, u8), today: NaiveDate) -> bool {
    let age = age_on(candidate.date_of_birth, today);
    age >= u32::from(bounds.0) && age <= u32::from(bounds.1)
}

/// Check the candidate against the viewer's distance limit.
///
/// No limit applies when the viewer has no location or no `maxDistance`.
/// With a limit in force, a candidate without a location is rejected.
#[inline]
pub fn within_distance(viewer: &User, candidate: &User) -> bool {
    let (Some(origin), Some(max_km)) = (viewer.location, viewer.preferences.max_distance_km)
    else {
        return true;
    };

    candidate
        .location
        .map_or(false, |loc| distance_km(origin, loc) <= f64::from(max_km))
}

/// Does `viewer`'s preference block accept `candidate`?
#[inline]
pub fn accepts(viewer: &User, candidate: &User, today: NaiveDate) -> bool {
    matches_gender(candidate, viewer.preferences.interested_in)
        && within_age_range(candidate, viewer.preferences.age_bounds(), today)
        && within_distance(viewer, candidate)
}

/// Exact eligibility check applied after the storage prefilter.
///
/// Decisions and blocks are excluded by the store; everything that depends
/// on the query date or precise distance is decided here.
pub fn is_eligible(requester: &User, candidate: &User, today: NaiveDate, reciprocal: bool) -> bool {
    if candidate.id == requester.id || candidate.is_blocked {
        return false;
    }

    if !accepts(requester, candidate, today) {
        return false;
    }

    !reciprocal || accepts(candidate, requester, today)
}

/// Build the storage prefilter for a requester's discovery queue
pub fn build_candidate_query(requester: &User, today: NaiveDate) -> CandidateQuery {
    let (min_age, max_age) = requester.preferences.age_bounds();
    let (born_after, born_on_or_before) = birth_window(min_age, max_age, today);

    let bounding_box = match (requester.location, requester.preferences.max_distance_km) {
        (Some(origin), Some(max_km)) => Some(calculate_bounding_box(
            origin.latitude,
            origin.longitude,
            f64::from(max_km),
        )),
        _ => None,
    };

    CandidateQuery {
        requester_id: requester.id,
        gender: requester.preferences.interested_in,
        born_after,
        born_on_or_before,
        bounding_box,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, Preferences};
    use chrono::Utc;
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn create_test_user(born: (i32, u32, u32), gender: Gender, lat: f64, lon: f64) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            gender,
            date_of_birth: NaiveDate::from_ymd_opt(born.0, born.1, born.2).unwrap(),
            location: Some(Coordinates { latitude: lat, longitude: lon }),
            preferences: Preferences::default(),
            last_active: Utc::now(),
            is_blocked: false,
            created_at: Utc::now(),
        }
    }

    fn create_requester() -> User {
        let mut user = create_test_user((1995, 1, 1), Gender::Male, 40.7128, -74.0060);
        user.preferences = Preferences {
            min_age: Some(21),
            max_age: Some(35),
            interested_in: Some(Gender::Female),
            max_distance_km: Some(50),
        };
        user
    }

    #[test]
    fn test_eligible_candidate() {
        let requester = create_requester();
        let candidate = create_test_user((1998, 3, 1), Gender::Female, 40.72, -74.01);

        assert!(is_eligible(&requester, &candidate, today(), false));
    }

    #[test]
    fn test_fail_age() {
        let requester = create_requester();
        let candidate = create_test_user((1985, 3, 1), Gender::Female, 40.72, -74.01);

        assert!(!is_eligible(&requester, &candidate, today(), false));
    }

    #[test]
    fn test_fail_gender() {
        let requester = create_requester();
        let candidate = create_test_user((1998, 3, 1), Gender::Male, 40.72, -74.01);

        assert!(!is_eligible(&requester, &candidate, today(), false));
    }

    #[test]
    fn test_fail_distance() {
        let requester = create_requester();
        // ~90km north
        let candidate = create_test_user((1998, 3, 1), Gender::Female, 41.5, -74.0);

        assert!(!is_eligible(&requester, &candidate, today(), false));
    }

    #[test]
    fn test_missing_location_with_limit() {
        let requester = create_requester();
        let mut candidate = create_test_user((1998, 3, 1), Gender::Female, 0.0, 0.0);
        candidate.location = None;

        assert!(!is_eligible(&requester, &candidate, today(), false));
    }

    #[test]
    fn test_no_distance_limit_without_requester_location() {
        let mut requester = create_requester();
        requester.location = None;
        let candidate = create_test_user((1998, 3, 1), Gender::Female, -33.9, 151.2);

        assert!(is_eligible(&requester, &candidate, today(), false));
    }

    #[test]
    fn test_moderated_and_self_excluded() {
        let requester = create_requester();
        let mut flagged = create_test_user((1998, 3, 1), Gender::Female, 40.72, -74.01);
        flagged.is_blocked = true;

        assert!(!is_eligible(&requester, &flagged, today(), false));
        assert!(!is_eligible(&requester, &requester, today(), false));
    }

    #[test]
    fn test_reciprocal_preferences() {
        let requester = create_requester();
        let mut candidate = create_test_user((1998, 3, 1), Gender::Female, 40.72, -74.01);
        candidate.preferences.interested_in = Some(Gender::Female);

        assert!(is_eligible(&requester, &candidate, today(), false));
        assert!(!is_eligible(&requester, &candidate, today(), true));

        candidate.preferences.interested_in = Some(Gender::Male);
        assert!(is_eligible(&requester, &candidate, today(), true));
    }

    #[test]
    fn test_candidate_query_bounds() {
        let requester = create_requester();
        let query = build_candidate_query(&requester, today());

        assert_eq!(query.requester_id, requester.id);
        assert_eq!(query.gender, Some(Gender::Female));
        assert_eq!(query.born_on_or_before, NaiveDate::from_ymd_opt(2004, 6, 15).unwrap());
        assert_eq!(query.born_after, NaiveDate::from_ymd_opt(1989, 6, 15).unwrap());
        assert!(query.bounding_box.is_some());
    }
}
