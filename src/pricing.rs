//! Listing label resolution.
//!
//! A listing carries three price columns but only the one matching its
//! [`ListingLabel`] may be set. Everything that writes prices goes through
//! [`resolve_for_create`] or [`resolve_for_update`].

use thiserror::Error;

use crate::models::ListingLabel;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pricing {
    pub price_per_month: Option<f64>,
    pub price_per_night: Option<f64>,
    pub price_total: Option<f64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Invalid label. Use one of: monthly, night, sell")]
    InvalidLabel,
    #[error("Unable to determine listing label. Provide label/listingLabel or one pricing field")]
    Undetermined,
    #[error("{} listings require {}", .0.name(), .0.price_field())]
    MissingPrice(ListingLabel),
}

impl ListingLabel {
    /// Accepts the spellings clients have historically sent.
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "monthly" | "monthl" | "month" | "permonth" | "per_month" => {
                Some(ListingLabel::Monthly)
            }
            "night" | "nightly" | "pernight" | "per_night" => Some(ListingLabel::Night),
            "sell" | "sale" | "forsale" | "for_sale" => Some(ListingLabel::Sell),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ListingLabel::Monthly => "Monthly",
            ListingLabel::Night => "Night",
            ListingLabel::Sell => "Sell",
        }
    }

    /// Request field name of the price this label makes authoritative.
    pub fn price_field(self) -> &'static str {
        match self {
            ListingLabel::Monthly => "pricePerMonth",
            ListingLabel::Night => "pricePerNight",
            ListingLabel::Sell => "priceTotal",
        }
    }
}

impl Pricing {
    pub fn price_for(&self, label: ListingLabel) -> Option<f64> {
        match label {
            ListingLabel::Monthly => self.price_per_month,
            ListingLabel::Night => self.price_per_night,
            ListingLabel::Sell => self.price_total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.price_per_month.is_none()
            && self.price_per_night.is_none()
            && self.price_total.is_none()
    }
}

/// Nightly, then monthly, then total: the first price present decides.
pub fn infer_label(pricing: &Pricing) -> Option<ListingLabel> {
    if pricing.price_per_night.is_some() {
        Some(ListingLabel::Night)
    } else if pricing.price_per_month.is_some() {
        Some(ListingLabel::Monthly)
    } else if pricing.price_total.is_some() {
        Some(ListingLabel::Sell)
    } else {
        None
    }
}

/// Keeps only the price matching `label`; fails if that price is missing.
pub fn normalize(label: ListingLabel, pricing: &Pricing) -> Result<Pricing, PricingError> {
    let price = pricing
        .price_for(label)
        .ok_or(PricingError::MissingPrice(label))?;

    let mut normalized = Pricing::default();
    match label {
        ListingLabel::Monthly => normalized.price_per_month = Some(price),
        ListingLabel::Night => normalized.price_per_night = Some(price),
        ListingLabel::Sell => normalized.price_total = Some(price),
    }
    Ok(normalized)
}

fn explicit_label(raw: Option<&str>) -> Result<Option<ListingLabel>, PricingError> {
    match raw {
        None => Ok(None),
        Some(value) => ListingLabel::parse_loose(value)
            .map(Some)
            .ok_or(PricingError::InvalidLabel),
    }
}

pub fn resolve_for_create(
    raw_label: Option<&str>,
    pricing: &Pricing,
) -> Result<(ListingLabel, Pricing), PricingError> {
    let label = match explicit_label(raw_label)? {
        Some(label) => label,
        None => infer_label(pricing).ok_or(PricingError::Undetermined)?,
    };
    Ok((label, normalize(label, pricing)?))
}

/// Like [`resolve_for_create`] but falls back to the stored label when
/// nothing else decides it. `pricing` must already have unsent fields filled
/// from the stored row.
pub fn resolve_for_update(
    raw_label: Option<&str>,
    pricing: &Pricing,
    current: ListingLabel,
) -> Result<(ListingLabel, Pricing), PricingError> {
    let label = explicit_label(raw_label)?
        .or_else(|| infer_label(pricing))
        .unwrap_or(current);
    Ok((label, normalize(label, pricing)?))
}

/// Parses an optional numeric form value. Empty or non-finite input is `None`.
pub fn parse_price(raw: Option<&str>) -> Option<f64> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|parsed| parsed.is_finite())
}
