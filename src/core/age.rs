use chrono::{Datelike, Months, NaiveDate};

/// Age in completed years on `today`
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    if date_of_birth > today {
        return 0;
    }
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

/// The date exactly `years` years before `today`; Feb 29 clamps to Feb 28
pub fn years_before(today: NaiveDate, years: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

/// Birth-date window for an inclusive age range.
///
/// Returns `(born_after, born_on_or_before)`: a person is `min_age..=max_age`
/// years old on `today` exactly when `born_after < dob <= born_on_or_before`.
pub fn birth_window(min_age: u8, max_age: u8, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let born_on_or_before = years_before(today, u32::from(min_age));
    let born_after = years_before(today, u32::from(max_age) + 1);
    (born_after, born_on_or_before)
}
