use actix_multipart::{Multipart, MultipartError};
use futures_util::TryStreamExt;
use thiserror::Error;

use crate::clients::geocoding::LocationInput;
use crate::models::PropertyType;
use crate::pricing::{parse_price, Pricing};

/// Multipart field carrying listing photos.
pub const PHOTOS_FIELD: &str = "photos";

const MAIN_IMAGE_ALIASES: [&str; 3] = ["mainImageIndex", "mainPhotoIndex", "primaryImageIndex"];
const LOCATION_FIELDS: [&str; 7] = [
    "address",
    "city",
    "state",
    "country",
    "postalCode",
    "latitude",
    "longitude",
];
const PRICING_FIELDS: [&str; 5] = [
    "listingLabel",
    "label",
    "pricePerMonth",
    "pricePerNight",
    "priceTotal",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{0} must be a number")]
    InvalidNumber(&'static str),
    #[error("{0} must be an integer")]
    InvalidInteger(&'static str),
    #[error("{0}")]
    InvalidPropertyType(String),
}

#[derive(Debug, Error)]
pub enum FormReadError {
    #[error("Invalid multipart payload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Field '{field}' exceeds {limit} bytes")]
    FieldTooLarge { field: String, limit: usize },
    #[error("Upload exceeds {0} bytes")]
    TooLarge(usize),
}

/// Byte caps applied while the form is buffered.
#[derive(Debug, Clone, Copy)]
pub struct FormLimits {
    pub text_field: usize,
    pub photo: usize,
    pub total: usize,
}

impl Default for FormLimits {
    fn default() -> Self {
        Self {
            text_field: 64 * 1024,
            photo: 10 * 1024 * 1024,
            total: 50 * 1024 * 1024,
        }
    }
}

impl FormLimits {
    fn check(
        &self,
        field: &str,
        is_file: bool,
        field_len: usize,
        total: usize,
    ) -> Result<(), FormReadError> {
        let limit = if is_file { self.photo } else { self.text_field };
        if field_len > limit {
            return Err(FormReadError::FieldTooLarge {
                field: field.to_string(),
                limit,
            });
        }
        if total > self.total {
            return Err(FormReadError::TooLarge(self.total));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Text fields and photo files of a property submission.
#[derive(Debug, Default)]
pub struct PropertyForm {
    fields: Vec<(String, String)>,
    pub photos: Vec<PhotoFile>,
}

impl PropertyForm {
    pub async fn read(payload: Multipart) -> Result<Self, FormReadError> {
        Self::read_limited(payload, FormLimits::default()).await
    }

    pub async fn read_limited(
        mut payload: Multipart,
        limits: FormLimits,
    ) -> Result<Self, FormReadError> {
        let mut form = PropertyForm::default();
        let mut total = 0;

        while let Some(mut field) = payload.try_next().await? {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field
                .content_disposition()
                .and_then(|disposition| disposition.get_filename())
                .map(str::to_string);
            let content_type = field
                .content_type()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let mut bytes = Vec::new();
            while let Some(chunk) = field.try_next().await? {
                total += chunk.len();
                limits.check(&name, file_name.is_some(), bytes.len() + chunk.len(), total)?;
                bytes.extend_from_slice(&chunk);
            }

            match file_name {
                Some(file_name) if name == PHOTOS_FIELD => form.photos.push(PhotoFile {
                    file_name,
                    content_type,
                    bytes,
                }),
                Some(file_name) => {
                    log::debug!("Skipping unexpected file '{file_name}' in field '{name}'");
                }
                None => form
                    .fields
                    .push((name, String::from_utf8_lossy(&bytes).into_owned())),
            }
        }

        Ok(form)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            photos: Vec::new(),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Present and non-blank.
    pub fn filled(&self, key: &str) -> Option<&str> {
        self.text(key).filter(|value| !value.trim().is_empty())
    }

    pub fn values(&self, key: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn required_text(&self, key: &'static str) -> Result<String, FormError> {
        self.filled(key)
            .map(|value| value.trim().to_string())
            .ok_or(FormError::Missing(key))
    }

    /// Blank or missing is `None`; anything else must parse.
    pub fn number(&self, key: &'static str) -> Result<Option<f64>, FormError> {
        self.filled(key)
            .map(|raw| {
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or(FormError::InvalidNumber(key))
            })
            .transpose()
    }

    pub fn integer(&self, key: &'static str) -> Result<Option<i32>, FormError> {
        self.filled(key)
            .map(|raw| {
                raw.trim()
                    .parse::<i32>()
                    .map_err(|_| FormError::InvalidInteger(key))
            })
            .transpose()
    }

    pub fn required_number(&self, key: &'static str) -> Result<f64, FormError> {
        self.number(key)?.ok_or(FormError::Missing(key))
    }

    pub fn required_integer(&self, key: &'static str) -> Result<i32, FormError> {
        self.integer(key)?.ok_or(FormError::Missing(key))
    }

    /// Only the literal `true` switches a flag on.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.text(key).map(|value| value.trim() == "true")
    }

    /// Comma-joined and/or repeated values, `None` when the field was not sent.
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        if !self.has(key) {
            return None;
        }
        Some(split_list(&self.values(key)))
    }

    pub fn property_type(&self) -> Result<Option<PropertyType>, FormError> {
        self.filled("propertyType")
            .map(|raw| {
                PropertyType::parse(raw)
                    .ok_or_else(|| FormError::InvalidPropertyType(PropertyType::invalid_message()))
            })
            .transpose()
    }

    /// `listingLabel` wins over its `label` alias.
    pub fn raw_label(&self) -> Option<&str> {
        self.text("listingLabel").or_else(|| self.text("label"))
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            price_per_month: parse_price(self.text("pricePerMonth")),
            price_per_night: parse_price(self.text("pricePerNight")),
            price_total: parse_price(self.text("priceTotal")),
        }
    }

    /// Sent price fields override `stored`; unsent ones keep it.
    pub fn pricing_over(&self, stored: &Pricing) -> Pricing {
        let resolve = |key: &str, current: Option<f64>| {
            if self.has(key) {
                parse_price(self.text(key))
            } else {
                current
            }
        };
        Pricing {
            price_per_month: resolve("pricePerMonth", stored.price_per_month),
            price_per_night: resolve("pricePerNight", stored.price_per_night),
            price_total: resolve("priceTotal", stored.price_total),
        }
    }

    pub fn touches_pricing(&self) -> bool {
        PRICING_FIELDS.iter().any(|key| self.has(key))
    }

    pub fn touches_location(&self) -> bool {
        LOCATION_FIELDS.iter().any(|key| self.filled(key).is_some())
    }

    pub fn main_image_index(&self) -> Option<&str> {
        MAIN_IMAGE_ALIASES.iter().find_map(|key| self.text(key))
    }

    /// Photos the client keeps on update, `None` when it did not say.
    pub fn existing_photos(&self) -> Option<Vec<String>> {
        if !self.has("existingPhotos") {
            return None;
        }
        Some(
            self.values("existingPhotos")
                .into_iter()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn location_input(&self) -> LocationInput {
        let owned = |key: &str| self.filled(key).map(|value| value.trim().to_string());
        LocationInput {
            latitude: parse_price(self.text("latitude")),
            longitude: parse_price(self.text("longitude")),
            address: owned("address"),
            city: owned("city"),
            state: owned("state"),
            country: owned("country"),
            postal_code: owned("postalCode"),
        }
    }
}

pub fn split_list(values: &[&str]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
