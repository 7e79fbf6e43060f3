use chrono::{DateTime, Duration, Months, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::models::{ListingLabel, Property};
use crate::pricing::Pricing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("Property has no listed price")]
    NoListedPrice,
    #[error("{} listing is missing {}", .0.name(), .0.price_field())]
    ListingMissingPrice(ListingLabel),
    #[error("stayDays is required and must be a positive integer for nightly properties")]
    StayDaysRequired,
    #[error("Property is missing {}", .0.price_field())]
    PropertyMissingPrice(ListingLabel),
    #[error("Application is missing stayDays for a nightly-priced property")]
    ApplicationMissingStayDays,
    #[error("Property is not for rent")]
    NotForRent,
}

/// Dates and amounts of the lease created when an application is approved.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseTerms {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub rent: f64,
    pub deposit: f64,
}

impl Property {
    pub fn pricing(&self) -> Pricing {
        Pricing {
            price_per_month: self.price_per_month,
            price_per_night: self.price_per_night,
            price_total: self.price_total,
        }
    }
}

/// A positive integer given as a JSON number or numeric string.
pub fn parse_stay_days(value: Option<&Value>) -> Option<i32> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if parsed.is_finite() && parsed.fract() == 0.0 && parsed > 0.0 && parsed <= i32::MAX as f64 {
        Some(parsed as i32)
    } else {
        None
    }
}

/// Checks an incoming application against the listing it targets.
///
/// Returns the stay length to store: only nightly listings keep one.
pub fn admit_application(
    label: ListingLabel,
    pricing: &Pricing,
    stay_days: Option<&Value>,
) -> Result<Option<i32>, LeaseError> {
    if pricing.is_empty() {
        return Err(LeaseError::NoListedPrice);
    }
    if pricing.price_for(label).is_none() {
        return Err(LeaseError::ListingMissingPrice(label));
    }

    match label {
        ListingLabel::Night => parse_stay_days(stay_days)
            .map(Some)
            .ok_or(LeaseError::StayDaysRequired),
        ListingLabel::Monthly | ListingLabel::Sell => Ok(None),
    }
}

/// Nightly stays end after `stay_days` days at `pricePerNight * stay_days`;
/// monthly rentals run one year at `pricePerMonth`. Sales never produce a lease.
pub fn lease_terms(
    property: &Property,
    stay_days: Option<i32>,
    start_date: DateTime<Utc>,
) -> Result<LeaseTerms, LeaseError> {
    let (end_date, rent) = match property.listing_label {
        ListingLabel::Night => {
            let nightly = property
                .price_per_night
                .ok_or(LeaseError::PropertyMissingPrice(ListingLabel::Night))?;
            let days = stay_days
                .filter(|days| *days > 0)
                .ok_or(LeaseError::ApplicationMissingStayDays)?;
            (start_date + Duration::days(i64::from(days)), nightly * f64::from(days))
        }
        ListingLabel::Monthly => {
            let monthly = property
                .price_per_month
                .ok_or(LeaseError::PropertyMissingPrice(ListingLabel::Monthly))?;
            let end_date = start_date
                .checked_add_months(Months::new(12))
                .unwrap_or_else(|| start_date + Duration::days(365));
            (end_date, monthly)
        }
        ListingLabel::Sell => return Err(LeaseError::NotForRent),
    };

    Ok(LeaseTerms {
        start_date,
        end_date,
        rent,
        deposit: property.security_deposit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, PropertyType};
    use chrono::TimeZone;
    use serde_json::json;

    fn property(
        label: ListingLabel,
        month: Option<f64>,
        night: Option<f64>,
        total: Option<f64>,
    ) -> Property {
        Property {
            id: 1,
            name: "Villa Ivato".into(),
            description: "Garden view".into(),
            listing_label: label,
            price_per_month: month,
            price_per_night: night,
            price_total: total,
            security_deposit: 250.0,
            application_fee: 10.0,
            photo_urls: vec![],
            amenities: vec![],
            highlights: vec![],
            is_pets_allowed: false,
            is_parking_included: false,
            beds: 2,
            baths: 1.0,
            square_feet: 80,
            property_type: PropertyType::Villa,
            posted_date: Utc::now(),
            is_approved: ApprovalStatus::Approved,
            denied_reason: None,
            is_featured: false,
            featured_until: None,
            is_super_featured: false,
            super_featured_until: None,
            is_available: true,
            location_id: 1,
            manager_cognito_id: "mgr".into(),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn stay_days_parsing() {
        assert_eq!(parse_stay_days(Some(&json!(3))), Some(3));
        assert_eq!(parse_stay_days(Some(&json!("4"))), Some(4));
        assert_eq!(parse_stay_days(Some(&json!(2.0))), Some(2));
        assert_eq!(parse_stay_days(Some(&json!(0))), None);
        assert_eq!(parse_stay_days(Some(&json!(-2))), None);
        assert_eq!(parse_stay_days(Some(&json!(1.5))), None);
        assert_eq!(parse_stay_days(Some(&json!("soon"))), None);
        assert_eq!(parse_stay_days(Some(&Value::Null)), None);
        assert_eq!(parse_stay_days(None), None);
    }

    #[test]
    fn nightly_application_requires_stay_days() {
        let night = property(ListingLabel::Night, None, Some(40.0), None).pricing();
        assert_eq!(
            admit_application(ListingLabel::Night, &night, None).unwrap_err(),
            LeaseError::StayDaysRequired
        );
        assert_eq!(
            admit_application(ListingLabel::Night, &night, Some(&json!(5))).unwrap(),
            Some(5)
        );
    }

    #[test]
    fn monthly_application_accepts_missing_stay_days_and_drops_given_ones() {
        let monthly = property(ListingLabel::Monthly, Some(900.0), None, None).pricing();
        assert_eq!(admit_application(ListingLabel::Monthly, &monthly, None).unwrap(), None);
        assert_eq!(
            admit_application(ListingLabel::Monthly, &monthly, Some(&json!(5))).unwrap(),
            None
        );
    }

    #[test]
    fn application_against_unpriced_listing_is_rejected() {
        assert_eq!(
            admit_application(ListingLabel::Monthly, &Pricing::default(), None).unwrap_err(),
            LeaseError::NoListedPrice
        );
        let mismatched = property(ListingLabel::Sell, Some(900.0), None, None).pricing();
        let err = admit_application(ListingLabel::Sell, &mismatched, None).unwrap_err();
        assert_eq!(err.to_string(), "Sell listing is missing priceTotal");
    }

    #[test]
    fn monthly_lease_runs_one_year_at_monthly_rent() {
        let monthly = property(ListingLabel::Monthly, Some(900.0), None, None);
        let terms = lease_terms(&monthly, None, start()).unwrap();
        assert_eq!(terms.end_date, Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
        assert_eq!(terms.rent, 900.0);
        assert_eq!(terms.deposit, 250.0);
    }

    #[test]
    fn nightly_lease_runs_stay_days_at_nightly_total() {
        let nightly = property(ListingLabel::Night, None, Some(45.0), None);
        let terms = lease_terms(&nightly, Some(4), start()).unwrap();
        assert_eq!(terms.end_date, start() + Duration::days(4));
        assert_eq!(terms.rent, 180.0);
    }

    #[test]
    fn lease_failures() {
        let failure = |listing: Property, stay_days| {
            lease_terms(&listing, stay_days, start()).unwrap_err()
        };
        assert_eq!(
            failure(property(ListingLabel::Sell, None, None, Some(1e5)), None),
            LeaseError::NotForRent
        );
        assert_eq!(
            failure(property(ListingLabel::Night, None, Some(45.0), None), None),
            LeaseError::ApplicationMissingStayDays
        );
        assert_eq!(
            failure(property(ListingLabel::Monthly, None, None, None), None),
            LeaseError::PropertyMissingPrice(ListingLabel::Monthly)
        );
    }
}
