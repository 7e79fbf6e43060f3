use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

// ============================================================================
// ENUMS
// ============================================================================

/// Which price field is authoritative for a listing (Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "listing_label")]
pub enum ListingLabel {
    Monthly,
    Night,
    Sell,
}

/// Property category (Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "property_type")]
pub enum PropertyType {
    Rooms,
    Tinyhouse,
    Apartment,
    Villa,
    Townhouse,
    Cottage,
    Residential,
    Commercial,
    Land,
}

impl PropertyType {
    pub const ALL: [PropertyType; 9] = [
        PropertyType::Rooms,
        PropertyType::Tinyhouse,
        PropertyType::Apartment,
        PropertyType::Villa,
        PropertyType::Townhouse,
        PropertyType::Cottage,
        PropertyType::Residential,
        PropertyType::Commercial,
        PropertyType::Land,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::Rooms => "Rooms",
            PropertyType::Tinyhouse => "Tinyhouse",
            PropertyType::Apartment => "Apartment",
            PropertyType::Villa => "Villa",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::Cottage => "Cottage",
            PropertyType::Residential => "Residential",
            PropertyType::Commercial => "Commercial",
            PropertyType::Land => "Land",
        }
    }

    /// Case-insensitive match on the variant name.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(trimmed))
    }

    pub fn invalid_message() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
        format!("Invalid property type. Use one of: {}", names.join(", "))
    }
}

/// Admin review state of a listing (Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "approval_status")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

/// Tenant application lifecycle (Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "application_status")]
pub enum ApplicationStatus {
    Pending,
    Denied,
    Approved,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "payment_status")]
pub enum PaymentStatus {
    Pending,
    Paid,
    PartiallyPaid,
    Overdue,
}

// ============================================================================
// PROPERTIES
// ============================================================================

/// Property row as persisted
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub listing_label: ListingLabel,
    pub price_per_month: Option<f64>,
    pub price_per_night: Option<f64>,
    pub price_total: Option<f64>,
    pub security_deposit: f64,
    pub application_fee: f64,
    pub photo_urls: Vec<String>,
    pub amenities: Vec<String>,
    pub highlights: Vec<String>,
    pub is_pets_allowed: bool,
    pub is_parking_included: bool,
    pub beds: i32,
    pub baths: f64,
    pub square_feet: i32,
    pub property_type: PropertyType,
    pub posted_date: DateTime<Utc>,
    pub is_approved: ApprovalStatus,
    pub denied_reason: Option<String>,
    pub is_featured: bool,
    pub featured_until: Option<DateTime<Utc>>,
    pub is_super_featured: bool,
    pub super_featured_until: Option<DateTime<Utc>>,
    pub is_available: bool,
    pub location_id: i32,
    pub manager_cognito_id: String,
}

/// Helper struct used when inserting a new property
#[derive(Debug, Clone)]
pub struct NewProperty {
    pub name: String,
    pub description: String,
    pub listing_label: ListingLabel,
    pub price_per_month: Option<f64>,
    pub price_per_night: Option<f64>,
    pub price_total: Option<f64>,
    pub security_deposit: f64,
    pub application_fee: f64,
    pub photo_urls: Vec<String>,
    pub amenities: Vec<String>,
    pub highlights: Vec<String>,
    pub is_pets_allowed: bool,
    pub is_parking_included: bool,
    pub beds: i32,
    pub baths: f64,
    pub square_feet: i32,
    pub property_type: PropertyType,
    pub manager_cognito_id: String,
}

/// Partial update applied by a manager edit. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PropertyChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub pricing: Option<(ListingLabel, crate::pricing::Pricing)>,
    pub security_deposit: Option<f64>,
    pub application_fee: Option<f64>,
    pub beds: Option<i32>,
    pub baths: Option<f64>,
    pub square_feet: Option<i32>,
    pub property_type: Option<PropertyType>,
    pub is_pets_allowed: Option<bool>,
    pub is_parking_included: Option<bool>,
    pub amenities: Option<Vec<String>>,
    pub highlights: Option<Vec<String>>,
    pub photo_urls: Vec<String>,
    pub manager_cognito_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

/// Location with its point unpacked into longitude / latitude
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationView {
    pub id: i32,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub coordinates: Coordinates,
}

/// Property with its location and managing account
#[derive(Debug, Clone, Serialize)]
pub struct PropertyDetails {
    #[serde(flatten)]
    pub property: Property,
    pub location: LocationView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<Manager>,
}

// ============================================================================
// MANAGERS & TENANTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Manager {
    pub id: i32,
    pub cognito_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
}

/// Manager row with aggregate counts for admin dashboards
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSummary {
    pub id: i32,
    pub cognito_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub property_count: i32,
    pub application_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: i32,
    pub cognito_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantWithFavorites {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub favorites: Vec<Property>,
}

// ============================================================================
// APPLICATIONS, LEASES & PAYMENTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i32,
    pub application_date: DateTime<Utc>,
    pub status: ApplicationStatus,
    pub property_id: i32,
    pub tenant_cognito_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub message: Option<String>,
    pub stay_days: Option<i32>,
    pub lease_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub application_date: DateTime<Utc>,
    pub property_id: i32,
    pub tenant_cognito_id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub message: Option<String>,
    pub stay_days: Option<i32>,
}

/// Property as shown inside an application list entry
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationProperty {
    #[serde(flatten)]
    pub property: Property,
    pub address: Option<String>,
    pub location: LocationView,
}

/// Application list entry for tenant and manager dashboards
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListItem {
    #[serde(flatten)]
    pub application: Application,
    pub property: ApplicationProperty,
    pub tenant: Tenant,
    pub manager: Manager,
}

/// Application after a status decision, with the lease it produced
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDecision {
    #[serde(flatten)]
    pub application: Application,
    pub property: Property,
    pub tenant: Tenant,
    pub lease: Option<Lease>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub id: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub rent: f64,
    pub deposit: f64,
    pub property_id: i32,
    pub tenant_cognito_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaseDetails {
    #[serde(flatten)]
    pub lease: Lease,
    pub tenant: Tenant,
    pub property: Property,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i32,
    pub amount_due: f64,
    pub amount_paid: f64,
    pub due_date: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub lease_id: i32,
}

// ============================================================================
// REQUEST DTOs
// ============================================================================

/// Profile payload for both managers and tenants
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, max = 128))]
    pub cognito_id: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub phone_number: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationRequest {
    pub application_date: Option<DateTime<Utc>>,
    pub property_id: i32,
    #[validate(length(min = 1))]
    pub tenant_cognito_id: String,
    /// Number or numeric string; only meaningful for nightly listings.
    pub stay_days: Option<Value>,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub phone_number: String,
    #[validate(length(max = 4000))]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationStatusRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct DenyPropertyRequest {
    pub reason: Option<String>,
}

/// Raw JSON values so that `null` and non-boolean flags can be told apart from missing ones.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequest {
    #[serde(default, deserialize_with = "present")]
    pub is_featured: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub featured_until: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperFeatureRequest {
    #[serde(default, deserialize_with = "present")]
    pub is_super_featured: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub super_featured_until: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub is_available: Option<Value>,
}

/// Keeps an explicit `null` as `Some(Value::Null)` instead of collapsing it into `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_type_parse_is_case_insensitive() {
        assert_eq!(PropertyType::parse("villa"), Some(PropertyType::Villa));
        assert_eq!(PropertyType::parse(" LAND "), Some(PropertyType::Land));
        assert_eq!(PropertyType::parse("castle"), None);
    }

    #[test]
    fn invalid_property_type_message_lists_every_variant() {
        let message = PropertyType::invalid_message();
        for variant in PropertyType::ALL {
            assert!(message.contains(variant.as_str()));
        }
    }

    #[test]
    fn feature_request_keeps_explicit_null_expiry() {
        let with_null: FeatureRequest =
            serde_json::from_str(r#"{"featuredUntil": null}"#).unwrap();
        assert_eq!(with_null.featured_until, Some(Value::Null));

        let missing: FeatureRequest = serde_json::from_str("{}").unwrap();
        assert!(missing.featured_until.is_none());
        assert!(missing.is_featured.is_none());
    }

    #[test]
    fn property_details_serializes_camel_case_and_nests_location() {
        let details = PropertyDetails {
            property: Property {
                id: 7,
                name: "Loft".into(),
                description: "Bright".into(),
                listing_label: ListingLabel::Night,
                price_per_month: None,
                price_per_night: Some(80.0),
                price_total: None,
                security_deposit: 0.0,
                application_fee: 0.0,
                photo_urls: vec![],
                amenities: vec!["WiFi".into()],
                highlights: vec![],
                is_pets_allowed: false,
                is_parking_included: true,
                beds: 1,
                baths: 1.0,
                square_feet: 40,
                property_type: PropertyType::Apartment,
                posted_date: Utc::now(),
                is_approved: ApprovalStatus::Pending,
                denied_reason: None,
                is_featured: false,
                featured_until: None,
                is_super_featured: false,
                super_featured_until: None,
                is_available: true,
                location_id: 3,
                manager_cognito_id: "mgr-1".into(),
            },
            location: LocationView {
                id: 3,
                address: Some("1 Rue".into()),
                city: Some("Antananarivo".into()),
                state: None,
                country: Some("Madagascar".into()),
                postal_code: None,
                coordinates: Coordinates {
                    longitude: 47.5,
                    latitude: -18.9,
                },
            },
            manager: None,
        };

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["pricePerNight"], 80.0);
        assert_eq!(json["listingLabel"], "Night");
        assert_eq!(json["location"]["coordinates"]["latitude"], -18.9);
        assert!(json.get("manager").is_none());
    }
}
