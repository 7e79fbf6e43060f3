use reqwest::header::USER_AGENT;
use serde::Deserialize;

use crate::models::Coordinates;

/// Location fields as submitted with a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationInput {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl LocationInput {
    /// Both coordinates present and non-zero.
    fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) if latitude != 0.0 && longitude != 0.0 => {
                Some(Coordinates {
                    longitude,
                    latitude,
                })
            }
            _ => None,
        }
    }
}

/// Geocoded location ready to persist. Unknown coordinates are `(0, 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl ResolvedLocation {
    fn from_input(input: LocationInput, coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            address: input.address,
            city: input.city,
            state: input.state,
            country: input.country,
            postal_code: input.postal_code,
        }
    }

    pub fn has_coordinates(&self) -> bool {
        self.coordinates.latitude != 0.0 && self.coordinates.longitude != 0.0
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    address: Option<AddressDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressDetails {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    country: Option<String>,
    postcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

/// Nominatim-compatible geocoder. Lookups never fail the caller.
#[derive(Clone)]
pub struct GeocodingClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl GeocodingClient {
    pub fn new(base_url: String, user_agent: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(&base_url),
            user_agent,
        }
    }

    /// Reverse geocodes when coordinates were given, forward geocodes otherwise.
    pub async fn resolve(&self, input: LocationInput) -> ResolvedLocation {
        match input.coordinates() {
            Some(coordinates) => match self.reverse(coordinates).await {
                Ok(response) => apply_reverse(input, coordinates, response),
                Err(err) => {
                    log::error!("Reverse geocoding failed: {err}");
                    ResolvedLocation::from_input(input, coordinates)
                }
            },
            None => {
                let coordinates = match self.search(&input).await {
                    Ok(hits) => first_hit(&hits),
                    Err(err) => {
                        log::error!("Geocoding failed: {err}");
                        None
                    }
                };
                ResolvedLocation::from_input(input, coordinates.unwrap_or(ORIGIN))
            }
        }
    }

    async fn reverse(&self, coordinates: Coordinates) -> Result<ReverseResponse, reqwest::Error> {
        let url = format!("{}/reverse", self.base_url);
        self.client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .query(&[
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
                ("format", "jsonv2".to_string()),
                ("zoom", "18".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<ReverseResponse>()
            .await
    }

    async fn search(&self, input: &LocationInput) -> Result<Vec<SearchHit>, reqwest::Error> {
        let url = format!("{}/search", self.base_url);
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        self.client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .query(&[
                ("street", field(&input.address)),
                ("city", field(&input.city)),
                ("country", field(&input.country)),
                ("postalcode", field(&input.postal_code)),
                ("format", "json".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<SearchHit>>()
            .await
    }
}

const ORIGIN: Coordinates = Coordinates {
    longitude: 0.0,
    latitude: 0.0,
};

/// Replaces the submitted address fields when the geocoder returned any.
fn apply_reverse(
    input: LocationInput,
    coordinates: Coordinates,
    response: ReverseResponse,
) -> ResolvedLocation {
    let Some(details) = response.address else {
        return ResolvedLocation::from_input(input, coordinates);
    };

    let address = if details.road.is_some() || details.house_number.is_some() {
        let line = format!(
            "{} {}",
            details.house_number.as_deref().unwrap_or(""),
            details.road.as_deref().unwrap_or("")
        );
        Some(line.trim().to_string())
    } else {
        None
    };

    ResolvedLocation {
        coordinates,
        address,
        city: details
            .city
            .or(details.town)
            .or(details.village)
            .or(details.hamlet),
        state: details.state,
        country: details.country,
        postal_code: details.postcode,
    }
}

fn first_hit(hits: &[SearchHit]) -> Option<Coordinates> {
    let hit = hits.first()?;
    let longitude = hit.lon.trim().parse::<f64>().ok()?;
    let latitude = hit.lat.trim().parse::<f64>().ok()?;
    Some(Coordinates {
        longitude,
        latitude,
    })
}

fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}
