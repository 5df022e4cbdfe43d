// Unit tests for the Tandem decision engine

use chrono::{NaiveDate, TimeZone, Utc};
use tandem::core::{
    age::{age_on, birth_window},
    distance::{calculate_bounding_box, haversine_distance, is_valid_coordinates, is_within_bounding_box},
    filters::{build_candidate_query, is_eligible, within_distance},
    gate::{state_of, FirstMoverPolicy, MatchState},
};
use tandem::models::{Coordinates, Gender, PairKey, Preferences, User};
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn create_user(gender: Gender, date_of_birth: NaiveDate, location: Option<(f64, f64)>) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Test User".to_string(),
        gender,
        date_of_birth,
        location: location.map(|(latitude, longitude)| Coordinates { latitude, longitude }),
        preferences: Preferences::default(),
        last_active: Utc::now(),
        is_blocked: false,
        created_at: Utc::now(),
    }
}

#[test]
fn test_haversine_distance_zero() {
    let distance = haversine_distance(40.7128, -74.0060, 40.7128, -74.0060);
    assert!(distance < 0.01);
}

#[test]
fn test_haversine_distance_manhattan_to_brooklyn() {
    // Manhattan to Brooklyn is approximately 5-10 km
    let distance = haversine_distance(40.7580, -73.9855, 40.6782, -73.9442);
    assert!(distance > 5.0 && distance < 15.0);
}

#[test]
fn test_haversine_distance_is_symmetric() {
    let there = haversine_distance(48.8566, 2.3522, 51.5074, -0.1278);
    let back = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
    assert!((there - back).abs() < 1e-9);
    // Paris to London is roughly 344 km
    assert!((there - 344.0).abs() < 5.0);
}

#[test]
fn test_bounding_box_contains_center() {
    let bbox = calculate_bounding_box(40.7128, -74.0060, 10.0);

    assert!(is_within_bounding_box(40.7128, -74.0060, &bbox));
    assert!(!is_within_bounding_box(50.0, -80.0, &bbox));
    assert!(!is_within_bounding_box(bbox.max_lat + 0.01, -74.0, &bbox));

    // Roughly 0.18 degrees of latitude for 10 km either side
    let lat_span = bbox.max_lat - bbox.min_lat;
    assert!((lat_span - 0.18).abs() < 0.02);
}

#[test]
fn test_bounding_box_never_narrower_than_circle() {
    // Points exactly at the radius along each axis must be inside the box
    let (lat, lon, radius) = (60.0, 10.0, 100.0);
    let bbox = calculate_bounding_box(lat, lon, radius);

    assert!(is_within_bounding_box(lat + 0.899, lon, &bbox));
    assert!(is_within_bounding_box(lat - 0.899, lon, &bbox));
    // One degree of longitude at 60N is about 55.6 km
    assert!(is_within_bounding_box(lat, lon + 1.79, &bbox));
}

#[test]
fn test_bounding_box_keeps_far_east_point_at_70_north() {
    // 500 km around (70, 0) reaches past 13 degrees east at higher latitudes
    let bbox = calculate_bounding_box(70.0, 0.0, 500.0);
    let candidate = Coordinates { latitude: 70.9, longitude: 13.19 };

    assert!(haversine_distance(70.0, 0.0, candidate.latitude, candidate.longitude) < 500.0);
    assert!(is_within_bounding_box(candidate.latitude, candidate.longitude, &bbox));
    assert!(bbox.max_lon > 13.19 && bbox.min_lon < -13.19);
}

#[test]
fn test_coordinate_validation() {
    assert!(is_valid_coordinates(Coordinates { latitude: 0.0, longitude: 0.0 }));
    assert!(is_valid_coordinates(Coordinates { latitude: -90.0, longitude: 180.0 }));
    assert!(!is_valid_coordinates(Coordinates { latitude: 91.0, longitude: 0.0 }));
    assert!(!is_valid_coordinates(Coordinates { latitude: 0.0, longitude: -181.0 }));
    assert!(!is_valid_coordinates(Coordinates { latitude: f64::NAN, longitude: 0.0 }));
}

#[test]
fn test_age_in_whole_years() {
    let today = date(2025, 6, 15);
    assert_eq!(age_on(date(2000, 6, 15), today), 25);
    assert_eq!(age_on(date(2000, 6, 16), today), 24);
    assert_eq!(age_on(date(2000, 6, 14), today), 25);
}

#[test]
fn test_birth_window_matches_age() {
    let today = date(2025, 6, 15);
    let (born_after, born_on_or_before) = birth_window(25, 30, today);

    for dob in [date(2000, 6, 15), date(1995, 6, 16), date(1997, 1, 1)] {
        let age = age_on(dob, today);
        let in_window = dob > born_after && dob <= born_on_or_before;
        assert_eq!(in_window, (25..=30).contains(&age), "dob {}", dob);
    }
}

#[test]
fn test_age_boundary_excludes_day_before_birthday() {
    let today = date(2025, 6, 15);
    let mut requester = create_user(Gender::Male, date(1990, 1, 1), None);
    requester.preferences = Preferences {
        min_age: Some(25),
        max_age: Some(30),
        ..Default::default()
    };

    // One day short of 25
    let young = create_user(Gender::Female, date(2000, 6, 16), None);
    // Exactly 25 today
    let birthday = create_user(Gender::Female, date(2000, 6, 15), None);

    assert!(!is_eligible(&requester, &young, today, false));
    assert!(is_eligible(&requester, &birthday, today, false));
}

#[test]
fn test_gender_preference() {
    let today = date(2025, 6, 15);
    let mut requester = create_user(Gender::Male, date(1990, 1, 1), None);
    requester.preferences.interested_in = Some(Gender::Female);

    let female = create_user(Gender::Female, date(1995, 1, 1), None);
    let male = create_user(Gender::Male, date(1995, 1, 1), None);

    assert!(is_eligible(&requester, &female, today, false));
    assert!(!is_eligible(&requester, &male, today, false));
}

#[test]
fn test_reciprocal_preferences() {
    let today = date(2025, 6, 15);
    let mut requester = create_user(Gender::Male, date(1990, 1, 1), None);
    requester.preferences.interested_in = Some(Gender::Female);

    let mut candidate = create_user(Gender::Female, date(1995, 1, 1), None);
    candidate.preferences.interested_in = Some(Gender::Female);

    assert!(is_eligible(&requester, &candidate, today, false));
    assert!(!is_eligible(&requester, &candidate, today, true));
}

#[test]
fn test_moderated_and_self_never_eligible() {
    let today = date(2025, 6, 15);
    let requester = create_user(Gender::Male, date(1990, 1, 1), None);
    let mut flagged = create_user(Gender::Female, date(1995, 1, 1), None);
    flagged.is_blocked = true;

    assert!(!is_eligible(&requester, &flagged, today, false));
    assert!(!is_eligible(&requester, &requester, today, false));
}

#[test]
fn test_distance_filter_rules() {
    let mut viewer = create_user(Gender::Male, date(1990, 1, 1), Some((40.7128, -74.0060)));
    viewer.preferences.max_distance_km = Some(10);

    let close = create_user(Gender::Female, date(1995, 1, 1), Some((40.72, -74.01)));
    let far = create_user(Gender::Female, date(1995, 1, 1), Some((42.3601, -71.0589)));
    let unknown = create_user(Gender::Female, date(1995, 1, 1), None);

    assert!(within_distance(&viewer, &close));
    assert!(!within_distance(&viewer, &far));
    // A limit is in force, so an unknown location is excluded
    assert!(!within_distance(&viewer, &unknown));

    // Without a viewer location no distance limit applies
    viewer.location = None;
    assert!(within_distance(&viewer, &far));
    assert!(within_distance(&viewer, &unknown));
}

#[test]
fn test_candidate_query_prefilter() {
    let today = date(2025, 6, 15);
    let mut requester = create_user(Gender::Male, date(1990, 1, 1), Some((40.7128, -74.0060)));
    requester.preferences = Preferences {
        min_age: Some(21),
        max_age: Some(35),
        interested_in: Some(Gender::Female),
        max_distance_km: Some(50),
    };

    let query = build_candidate_query(&requester, today);
    assert_eq!(query.requester_id, requester.id);
    assert_eq!(query.gender, Some(Gender::Female));
    assert_eq!(query.born_on_or_before, date(2004, 6, 15));
    assert_eq!(query.born_after, date(1989, 6, 15));
    assert!(query.bounding_box.is_some());

    requester.preferences.max_distance_km = None;
    assert!(build_candidate_query(&requester, today).bounding_box.is_none());
}

#[test]
fn test_pair_key_is_unordered() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
    assert_eq!(PairKey::new(a, b).lock_key(), PairKey::new(b, a).lock_key());
    assert!(PairKey::new(a, b).low <= PairKey::new(a, b).high);
}

#[test]
fn test_match_state_transitions() {
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let window = chrono::Duration::hours(24);

    assert_eq!(
        state_of(created, false, created + chrono::Duration::hours(23), window),
        MatchState::Unconsummated { window_open: true }
    );
    assert_eq!(
        state_of(created, false, created + chrono::Duration::hours(25), window),
        MatchState::Unconsummated { window_open: false }
    );
    assert_eq!(
        state_of(created, true, created + chrono::Duration::hours(25), window),
        MatchState::Consummated
    );
}

#[test]
fn test_first_mover_default_is_female() {
    let policy = FirstMoverPolicy::default();
    assert!(policy.allows(Gender::Female, Gender::Male));
    assert!(!policy.allows(Gender::Male, Gender::Female));
    assert!(policy.allows(Gender::Male, Gender::NonBinary));
}
