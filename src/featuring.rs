use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::filters::parse_date;

/// Which paid placement a request toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    Featured,
    SuperFeatured,
}

impl Promotion {
    pub fn flag_field(self) -> &'static str {
        match self {
            Promotion::Featured => "isFeatured",
            Promotion::SuperFeatured => "isSuperFeatured",
        }
    }

    pub fn until_field(self) -> &'static str {
        match self {
            Promotion::Featured => "featuredUntil",
            Promotion::SuperFeatured => "superFeaturedUntil",
        }
    }

    pub(crate) fn flag_column(self) -> &'static str {
        match self {
            Promotion::Featured => "is_featured",
            Promotion::SuperFeatured => "is_super_featured",
        }
    }

    pub(crate) fn until_column(self) -> &'static str {
        match self {
            Promotion::Featured => "featured_until",
            Promotion::SuperFeatured => "super_featured_until",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromotionError {
    #[error("Invalid {} date", .0.until_field())]
    InvalidDate(Promotion),
    #[error("Provide {} or {}", .0.flag_field(), .0.until_field())]
    NothingToApply(Promotion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Keep,
    Clear,
    Set(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionUpdate {
    pub promotion: Promotion,
    pub flag: Option<bool>,
    pub until: Expiry,
}

/// Turns a raw `{flag?, until?}` body into the columns to write.
///
/// A missing flag counts as `true`; a flag that is present but not a boolean
/// is ignored. Setting an expiry switches the flag on unless the body turned
/// it off explicitly.
pub fn resolve(
    promotion: Promotion,
    raw_flag: Option<&Value>,
    raw_until: Option<&Value>,
) -> Result<PromotionUpdate, PromotionError> {
    let requested = match raw_flag {
        None => Some(true),
        Some(Value::Bool(flag)) => Some(*flag),
        Some(_) => None,
    };

    let mut flag = requested;
    let mut until = match requested {
        Some(false) => Expiry::Clear,
        _ => Expiry::Keep,
    };

    if let Some(raw) = raw_until {
        until = match raw {
            Value::Null => Expiry::Clear,
            other => Expiry::Set(
                parse_expiry(other).ok_or(PromotionError::InvalidDate(promotion))?,
            ),
        };
        if requested != Some(false) {
            flag = Some(true);
        }
    }

    if flag.is_none() && until == Expiry::Keep {
        return Err(PromotionError::NothingToApply(promotion));
    }

    Ok(PromotionUpdate {
        promotion,
        flag,
        until,
    })
}

/// Date strings, or epoch milliseconds.
fn parse_expiry(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(text) => parse_date(text),
        Value::Number(number) => DateTime::from_timestamp_millis(number.as_i64()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn empty_body_features_without_touching_expiry() {
        let update = resolve(Promotion::Featured, None, None).unwrap();
        assert_eq!(update.flag, Some(true));
        assert_eq!(update.until, Expiry::Keep);
    }

    #[test]
    fn unfeaturing_clears_expiry() {
        let update = resolve(Promotion::Featured, Some(&json!(false)), None).unwrap();
        assert_eq!(update.flag, Some(false));
        assert_eq!(update.until, Expiry::Clear);
    }

    #[test]
    fn expiry_turns_flag_on() {
        let update = resolve(Promotion::SuperFeatured, None, Some(&json!("2025-06-01"))).unwrap();
        assert_eq!(update.flag, Some(true));
        assert_eq!(
            update.until,
            Expiry::Set(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn explicit_false_wins_over_expiry() {
        let update = resolve(
            Promotion::Featured,
            Some(&json!(false)),
            Some(&json!("2025-06-01T10:00:00Z")),
        )
        .unwrap();
        assert_eq!(update.flag, Some(false));
        assert!(matches!(update.until, Expiry::Set(_)));
    }

    #[test]
    fn null_expiry_clears_it() {
        let update = resolve(Promotion::Featured, Some(&json!(true)), Some(&Value::Null)).unwrap();
        assert_eq!(update.until, Expiry::Clear);
    }

    #[test]
    fn rejects_bad_dates_and_empty_requests() {
        let err = resolve(Promotion::Featured, None, Some(&json!("someday"))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid featuredUntil date");

        let err = resolve(Promotion::SuperFeatured, Some(&json!("yes")), None).unwrap_err();
        assert_eq!(err.to_string(), "Provide isSuperFeatured or superFeaturedUntil");

        let err = resolve(Promotion::Featured, Some(&Value::Null), None).unwrap_err();
        assert_eq!(err, PromotionError::NothingToApply(Promotion::Featured));
    }

    #[test]
    fn epoch_millis_expiry() {
        let update = resolve(Promotion::Featured, None, Some(&json!(0))).unwrap();
        assert_eq!(update.until, Expiry::Set(Utc.timestamp_millis_opt(0).unwrap()));
    }
}
