//! Property search filters.
//!
//! The search query string is parsed into an ordered list of [`Predicate`]s.
//! Predicates render themselves into a `sqlx::QueryBuilder`: column names come
//! from closed enums and every client-supplied value is a bind parameter.
//! The data query and the count query are rendered from the same list.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;

use crate::database::{PROPERTY_DETAIL_COLUMNS, PROPERTY_JOINS};
use crate::models::{ApprovalStatus, ListingLabel, PropertyType};
use crate::pagination::Pagination;

/// Search radius around `latitude`/`longitude`.
pub const SEARCH_RADIUS_KM: f64 = 100.0;
/// Degrees-per-kilometre approximation used for the radius; only accurate near the equator.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Raw query-string pairs, keeping repeated keys.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::from_params(self.first("page"), self.first("limit"))
    }

    /// Present, non-blank and not the `any` wildcard.
    fn active(&self, key: &str) -> Option<&str> {
        self.first(key).filter(|value| is_active(value))
    }
}

fn is_active(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("any")
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid listing label. Use one of: monthly, night, sell")]
    InvalidListingLabel,
    #[error("{0}")]
    InvalidPropertyType(String),
    #[error("{0} must be a number")]
    InvalidNumber(&'static str),
    #[error("{0} must be true or false")]
    InvalidBoolean(&'static str),
    #[error("favoriteIds must be a comma-separated list of property ids")]
    InvalidIds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericColumn {
    PricePerMonth,
    PricePerNight,
    PriceTotal,
    Beds,
    Baths,
    SquareFeet,
}

impl NumericColumn {
    fn sql(self) -> &'static str {
        match self {
            NumericColumn::PricePerMonth => "p.price_per_month",
            NumericColumn::PricePerNight => "p.price_per_night",
            NumericColumn::PriceTotal => "p.price_total",
            NumericColumn::Beds => "p.beds",
            NumericColumn::Baths => "p.baths",
            NumericColumn::SquareFeet => "p.square_feet",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Featured(bool),
    SuperFeatured(bool),
    Approval(ApprovalStatus),
    IdIn(Vec<i32>),
    Label(ListingLabel),
    Type(PropertyType),
    AtLeast(NumericColumn, f64),
    AtMost(NumericColumn, f64),
    AmenitiesContain(Vec<String>),
    /// Some lease on the property started on or before the instant.
    LeaseStartedBy(DateTime<Utc>),
    WithinRadius {
        latitude: f64,
        longitude: f64,
        degrees: f64,
    },
    ManagedBy(String),
    /// The tenant currently occupies the property.
    OccupiedBy(String),
}

impl Predicate {
    fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Predicate::Featured(value) => {
                qb.push("p.is_featured = ").push_bind(*value);
            }
            Predicate::SuperFeatured(value) => {
                qb.push("p.is_super_featured = ").push_bind(*value);
            }
            Predicate::Approval(status) => {
                qb.push("p.is_approved = ").push_bind(*status);
            }
            Predicate::IdIn(ids) => {
                qb.push("p.id = ANY(").push_bind(ids.clone()).push(")");
            }
            Predicate::Label(label) => {
                qb.push("p.listing_label = ").push_bind(*label);
            }
            Predicate::Type(property_type) => {
                qb.push("p.property_type = ").push_bind(*property_type);
            }
            Predicate::AtLeast(column, value) => {
                qb.push(column.sql()).push(" >= ").push_bind(*value);
            }
            Predicate::AtMost(column, value) => {
                qb.push(column.sql()).push(" <= ").push_bind(*value);
            }
            Predicate::AmenitiesContain(amenities) => {
                qb.push("p.amenities @> ").push_bind(amenities.clone());
            }
            Predicate::LeaseStartedBy(date) => {
                qb.push(
                    "EXISTS (SELECT 1 FROM leases le \
                     WHERE le.property_id = p.id AND le.start_date <= ",
                )
                    .push_bind(*date)
                    .push(")");
            }
            Predicate::WithinRadius {
                latitude,
                longitude,
                degrees,
            } => {
                qb.push("ST_DWithin(l.coordinates::geometry, ST_SetSRID(ST_MakePoint(")
                    .push_bind(*longitude)
                    .push(", ")
                    .push_bind(*latitude)
                    .push("), 4326), ")
                    .push_bind(*degrees)
                    .push(")");
            }
            Predicate::ManagedBy(cognito_id) => {
                qb.push("p.manager_cognito_id = ").push_bind(cognito_id.clone());
            }
            Predicate::OccupiedBy(cognito_id) => {
                qb.push(
                    "EXISTS (SELECT 1 FROM property_tenants pt \
                     JOIN tenants t ON pt.tenant_id = t.id \
                     WHERE pt.property_id = p.id AND t.cognito_id = ",
                )
                .push_bind(cognito_id.clone())
                .push(")");
            }
        }
    }
}

/// Parsed property search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    pub predicates: Vec<Predicate>,
}

impl PropertyFilter {
    pub fn from_params(params: &QueryParams) -> Result<Self, FilterError> {
        let mut predicates = Vec::new();

        if let Some(raw) = params.active("isFeatured") {
            predicates.push(Predicate::Featured(parse_flag("isFeatured", raw)?));
        }
        if flag_set(params, "isApproved")? {
            predicates.push(Predicate::Approval(ApprovalStatus::Approved));
        }
        if flag_set(params, "isDenied")? {
            predicates.push(Predicate::Approval(ApprovalStatus::Denied));
        }
        if flag_set(params, "isPending")? {
            predicates.push(Predicate::Approval(ApprovalStatus::Pending));
        }
        if let Some(raw) = params.active("isSuperFeatured") {
            predicates.push(Predicate::SuperFeatured(parse_flag("isSuperFeatured", raw)?));
        }
        if let Some(raw) = params.active("favoriteIds") {
            predicates.push(Predicate::IdIn(parse_ids(raw)?));
        }

        let label = params
            .first("listingLabel")
            .or_else(|| params.first("label"))
            .filter(|value| is_active(value));
        if let Some(raw) = label {
            let label = ListingLabel::parse_loose(raw).ok_or(FilterError::InvalidListingLabel)?;
            predicates.push(Predicate::Label(label));
        }

        let bounds = [
            ("priceMin", NumericColumn::PricePerMonth, true),
            ("priceMax", NumericColumn::PricePerMonth, false),
            ("buyPriceMin", NumericColumn::PriceTotal, true),
            ("buyPriceMax", NumericColumn::PriceTotal, false),
            ("nightPriceMin", NumericColumn::PricePerNight, true),
            ("nightPriceMax", NumericColumn::PricePerNight, false),
            ("beds", NumericColumn::Beds, true),
            ("baths", NumericColumn::Baths, true),
            ("squareFeetMin", NumericColumn::SquareFeet, true),
            ("squareFeetMax", NumericColumn::SquareFeet, false),
        ];
        for (key, column, lower) in bounds {
            if let Some(raw) = params.active(key) {
                let value = parse_number(key, raw)?;
                predicates.push(if lower {
                    Predicate::AtLeast(column, value)
                } else {
                    Predicate::AtMost(column, value)
                });
            }
        }

        if let Some(raw) = params.active("propertyType") {
            let property_type = PropertyType::parse(raw)
                .ok_or_else(|| FilterError::InvalidPropertyType(PropertyType::invalid_message()))?;
            predicates.push(Predicate::Type(property_type));
        }

        let amenities = split_amenities(&params.all("amenities"));
        if !amenities.is_empty() {
            predicates.push(Predicate::AmenitiesContain(amenities));
        }

        if let Some(raw) = params.active("availableFrom") {
            match parse_date(raw) {
                Some(date) => predicates.push(Predicate::LeaseStartedBy(date)),
                None => log::debug!("Ignoring unparseable availableFrom '{raw}'"),
            }
        }

        if let (Some(lat), Some(lng)) = (params.active("latitude"), params.active("longitude")) {
            predicates.push(Predicate::WithinRadius {
                latitude: parse_number("latitude", lat)?,
                longitude: parse_number("longitude", lng)?,
                degrees: SEARCH_RADIUS_KM / KM_PER_DEGREE,
            });
        }

        Ok(Self { predicates })
    }

    pub fn only(predicate: Predicate) -> Self {
        Self {
            predicates: vec![predicate],
        }
    }

    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (index, predicate) in self.predicates.iter().enumerate() {
            qb.push(if index == 0 { " WHERE " } else { " AND " });
            predicate.push_sql(qb);
        }
    }

    /// Rows with nested location and manager columns, newest first.
    pub fn search_query(&self, pagination: &Pagination) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(PROPERTY_DETAIL_COLUMNS).push(PROPERTY_JOINS);
        self.push_where(&mut qb);
        qb.push(" ORDER BY p.id DESC");
        if pagination.paginate {
            qb.push(" LIMIT ")
                .push_bind(pagination.limit)
                .push(" OFFSET ")
                .push_bind(pagination.offset);
        }
        qb
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS total");
        qb.push(PROPERTY_JOINS);
        self.push_where(&mut qb);
        qb
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, FilterError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(FilterError::InvalidBoolean(key)),
    }
}

fn flag_set(params: &QueryParams, key: &'static str) -> Result<bool, FilterError> {
    params
        .active(key)
        .map_or(Ok(false), |raw| parse_flag(key, raw))
}

fn parse_number(key: &'static str, raw: &str) -> Result<f64, FilterError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(FilterError::InvalidNumber(key))
}

fn parse_ids(raw: &str) -> Result<Vec<i32>, FilterError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| id.parse::<i32>().map_err(|_| FilterError::InvalidIds))
        .collect()
}

/// Comma-joined and/or repeated values; the `any` wildcard is dropped.
pub fn split_amenities(values: &[&str]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| is_active(value))
        .map(str::to_owned)
        .collect()
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn sql_of(qb: QueryBuilder<'_, Postgres>) -> String {
        qb.sql().to_owned()
    }

    fn where_clause(sql: &str) -> &str {
        let start = sql.find(" WHERE ").unwrap_or(sql.len());
        let end = sql.find(" ORDER BY").unwrap_or(sql.len());
        &sql[start..end.max(start)]
    }

    #[test]
    fn empty_query_has_no_predicates() {
        let filter = PropertyFilter::from_params(&params(&[])).unwrap();
        assert!(filter.predicates.is_empty());

        let sql = sql_of(filter.search_query(&Pagination::from_params(None, None)));
        assert!(!sql.contains("WHERE"));
        assert!(!sql.contains("LIMIT"));
        assert!(sql.ends_with("ORDER BY p.id DESC"));
    }

    #[test]
    fn any_and_blank_values_are_skipped() {
        let filter = PropertyFilter::from_params(&params(&[
            ("beds", "any"),
            ("baths", "ANY"),
            ("propertyType", "any"),
            ("amenities", "any"),
            ("listingLabel", "any"),
            ("priceMin", ""),
            ("location", "Antananarivo"),
        ]))
        .unwrap();
        assert!(filter.predicates.is_empty());
    }

    #[test]
    fn predicates_follow_parameter_order() {
        let filter = PropertyFilter::from_params(&params(&[
            ("latitude", "-18.9"),
            ("longitude", "47.5"),
            ("beds", "2"),
            ("isApproved", "true"),
            ("propertyType", "villa"),
            ("squareFeetMin", "50"),
            ("amenities", "WiFi,Pool"),
            ("amenities", "Gym"),
        ]))
        .unwrap();

        assert_eq!(
            filter.predicates,
            vec![
                Predicate::Approval(ApprovalStatus::Approved),
                Predicate::AtLeast(NumericColumn::Beds, 2.0),
                Predicate::AtLeast(NumericColumn::SquareFeet, 50.0),
                Predicate::Type(PropertyType::Villa),
                Predicate::AmenitiesContain(vec!["WiFi".into(), "Pool".into(), "Gym".into()]),
                Predicate::WithinRadius {
                    latitude: -18.9,
                    longitude: 47.5,
                    degrees: 100.0 / 111.0,
                },
            ]
        );
    }

    #[test]
    fn price_bounds_are_not_gated_by_label() {
        let filter = PropertyFilter::from_params(&params(&[
            ("listingLabel", "night"),
            ("priceMin", "100"),
            ("buyPriceMax", "5000"),
            ("nightPriceMin", "10"),
        ]))
        .unwrap();

        assert_eq!(
            filter.predicates,
            vec![
                Predicate::Label(ListingLabel::Night),
                Predicate::AtLeast(NumericColumn::PricePerMonth, 100.0),
                Predicate::AtMost(NumericColumn::PriceTotal, 5000.0),
                Predicate::AtLeast(NumericColumn::PricePerNight, 10.0),
            ]
        );
    }

    #[test]
    fn label_alias_and_validation() {
        let filter = PropertyFilter::from_params(&params(&[("label", "sale")])).unwrap();
        assert_eq!(filter.predicates, vec![Predicate::Label(ListingLabel::Sell)]);

        assert_eq!(
            PropertyFilter::from_params(&params(&[("listingLabel", "weekly")])).unwrap_err(),
            FilterError::InvalidListingLabel
        );
        assert!(matches!(
            PropertyFilter::from_params(&params(&[("propertyType", "castle")])).unwrap_err(),
            FilterError::InvalidPropertyType(_)
        ));
    }

    #[test]
    fn malformed_numbers_and_ids_are_rejected() {
        assert_eq!(
            PropertyFilter::from_params(&params(&[("priceMax", "cheap")])).unwrap_err(),
            FilterError::InvalidNumber("priceMax")
        );
        assert_eq!(
            PropertyFilter::from_params(&params(&[("favoriteIds", "1,two")])).unwrap_err(),
            FilterError::InvalidIds
        );
        assert_eq!(
            PropertyFilter::from_params(&params(&[("isFeatured", "maybe")])).unwrap_err(),
            FilterError::InvalidBoolean("isFeatured")
        );
    }

    #[test]
    fn favorite_ids_and_flags() {
        let filter = PropertyFilter::from_params(&params(&[
            ("favoriteIds", "3, 5,8"),
            ("isFeatured", "false"),
            ("isPending", "0"),
            ("isDenied", "1"),
        ]))
        .unwrap();
        assert_eq!(
            filter.predicates,
            vec![
                Predicate::Featured(false),
                Predicate::Approval(ApprovalStatus::Denied),
                Predicate::IdIn(vec![3, 5, 8]),
            ]
        );
    }

    #[test]
    fn radius_needs_both_coordinates() {
        let filter = PropertyFilter::from_params(&params(&[("latitude", "-18.9")])).unwrap();
        assert!(filter.predicates.is_empty());
    }

    #[test]
    fn available_from_accepts_dates_and_ignores_garbage() {
        let filter =
            PropertyFilter::from_params(&params(&[("availableFrom", "2025-03-01")])).unwrap();
        let expected = parse_date("2025-03-01T00:00:00Z").unwrap();
        assert_eq!(filter.predicates, vec![Predicate::LeaseStartedBy(expected)]);

        let filter =
            PropertyFilter::from_params(&params(&[("availableFrom", "next tuesday")])).unwrap();
        assert!(filter.predicates.is_empty());
    }

    #[test]
    fn values_are_bound_never_inlined() {
        let filter = PropertyFilter::from_params(&params(&[
            ("propertyType", "Villa"),
            ("amenities", "Pool'; DROP TABLE properties; --"),
        ]))
        .unwrap();
        let sql = sql_of(filter.count_query());
        assert!(!sql.contains("DROP TABLE"));
        assert!(sql.contains("p.property_type = $1"));
        assert!(sql.contains("p.amenities @> $2"));
    }

    #[test]
    fn count_query_shares_the_data_query_filter() {
        let filter = PropertyFilter::from_params(&params(&[
            ("favoriteIds", "1,2"),
            ("priceMin", "100"),
            ("availableFrom", "2025-01-01"),
            ("latitude", "10"),
            ("longitude", "20"),
        ]))
        .unwrap();

        let pagination = Pagination::from_params(Some("2"), Some("10"));
        let data_sql = sql_of(filter.search_query(&pagination));
        let count_sql = sql_of(filter.count_query());

        assert!(!where_clause(&data_sql).is_empty());
        assert_eq!(where_clause(&data_sql), where_clause(&count_sql));
        assert!(data_sql.ends_with("ORDER BY p.id DESC LIMIT $7 OFFSET $8"));
        assert!(count_sql.starts_with("SELECT COUNT(*) AS total FROM properties p"));
    }

    #[test]
    fn scoped_listings_bind_the_account_id() {
        let sql = sql_of(PropertyFilter::only(Predicate::ManagedBy("mgr-1".into())).count_query());
        assert!(sql.ends_with("WHERE p.manager_cognito_id = $1"));

        let sql = sql_of(
            PropertyFilter::only(Predicate::OccupiedBy("tenant-1".into()))
                .search_query(&Pagination::from_params(None, None)),
        );
        assert!(sql.contains("t.cognito_id = $1)"));
        assert!(!sql.contains("tenant-1"));
    }
}
