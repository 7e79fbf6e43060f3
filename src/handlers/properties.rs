use actix_multipart::Multipart;
use actix_web::{delete, get, patch, post, web, HttpRequest, HttpResponse};
use serde_json::Value;

use super::{optional_json, query_params, require_role, Role};
use crate::clients::geocoding::{GeocodingClient, LocationInput};
use crate::clients::storage::ObjectStorage;
use crate::database::{is_foreign_key_violation, Database};
use crate::error::ApiError;
use crate::featuring::{self, Promotion};
use crate::filters::PropertyFilter;
use crate::form::{FormError, PropertyForm};
use crate::models::{
    AvailabilityRequest, DenyPropertyRequest, FeatureRequest, NewProperty, PropertyChanges,
    SuperFeatureRequest,
};
use crate::photos::apply_main_image_index;
use crate::pricing::{resolve_for_create, resolve_for_update};

#[get("/properties")]
pub async fn list_properties(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let params = query_params(&req)?;
    let filter = PropertyFilter::from_params(&params)?;
    let pagination = params.pagination();

    let (properties, total) = db
        .search_properties(&filter, &pagination)
        .await
        .map_err(ApiError::internal("retrieving properties"))?;

    Ok(HttpResponse::Ok().json(pagination.listing(properties, total)))
}

#[get("/properties/{id}")]
pub async fn get_property(
    db: web::Data<Database>,
    id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let details = db
        .get_property_details(id.into_inner())
        .await
        .map_err(ApiError::internal("retrieving property"))?
        .ok_or_else(|| ApiError::not_found("Property"))?;

    Ok(HttpResponse::Ok().json(details))
}

#[post("/properties")]
pub async fn create_property(
    req: HttpRequest,
    db: web::Data<Database>,
    geocoder: web::Data<GeocodingClient>,
    storage: web::Data<ObjectStorage>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let actor = require_role(&req, &[Role::Manager])?;
    let form = PropertyForm::read(payload).await?;

    let (listing_label, pricing) = resolve_for_create(form.raw_label(), &form.pricing())?;
    let mut property = NewProperty {
        name: form.required_text("name")?,
        description: form.required_text("description")?,
        listing_label,
        price_per_month: pricing.price_per_month,
        price_per_night: pricing.price_per_night,
        price_total: pricing.price_total,
        security_deposit: form.number("securityDeposit")?.unwrap_or(0.0),
        application_fee: form.number("applicationFee")?.unwrap_or(0.0),
        photo_urls: Vec::new(),
        amenities: form.list("amenities").unwrap_or_default(),
        highlights: form.list("highlights").unwrap_or_default(),
        is_pets_allowed: form.flag("isPetsAllowed").unwrap_or(false),
        is_parking_included: form.flag("isParkingIncluded").unwrap_or(false),
        beds: form.required_integer("beds")?,
        baths: form.required_number("baths")?,
        square_feet: form.required_integer("squareFeet")?,
        property_type: form
            .property_type()?
            .ok_or(FormError::Missing("propertyType"))?,
        manager_cognito_id: form
            .filled("managerCognitoId")
            .map(|id| id.trim().to_string())
            .unwrap_or(actor.id),
    };

    let uploaded = storage.upload_photos(&form.photos).await?;
    property.photo_urls = apply_main_image_index(uploaded, form.main_image_index())?;

    let location = geocoder.resolve(form.location_input()).await;

    let details = db.create_property(property, location).await.map_err(|err| {
        if is_foreign_key_violation(&err) {
            ApiError::not_found("Manager")
        } else {
            ApiError::internal("creating property")(err)
        }
    })?;

    Ok(HttpResponse::Created().json(details))
}

#[patch("/properties/{id}")]
pub async fn update_property(
    req: HttpRequest,
    db: web::Data<Database>,
    geocoder: web::Data<GeocodingClient>,
    storage: web::Data<ObjectStorage>,
    id: web::Path<i32>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager])?;
    let id = id.into_inner();

    let existing = db
        .get_property(id)
        .await
        .map_err(ApiError::internal("updating property"))?
        .ok_or_else(|| ApiError::not_found("Property"))?;
    let form = PropertyForm::read(payload).await?;

    let pricing = if form.touches_pricing() {
        Some(resolve_for_update(
            form.raw_label(),
            &form.pricing_over(&existing.pricing()),
            existing.listing_label,
        )?)
    } else {
        None
    };

    let mut changes = PropertyChanges {
        name: form.filled("name").map(str::to_string),
        description: form.filled("description").map(str::to_string),
        pricing,
        security_deposit: form.number("securityDeposit")?,
        application_fee: form.number("applicationFee")?,
        beds: form.integer("beds")?,
        baths: form.number("baths")?,
        square_feet: form.integer("squareFeet")?,
        property_type: form.property_type()?,
        is_pets_allowed: form.flag("isPetsAllowed"),
        is_parking_included: form.flag("isParkingIncluded"),
        amenities: form.list("amenities"),
        highlights: form.list("highlights"),
        photo_urls: Vec::new(),
        manager_cognito_id: form
            .filled("managerCognitoId")
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| existing.manager_cognito_id.clone()),
    };

    let mut photo_urls: Vec<String> = form
        .existing_photos()
        .unwrap_or_else(|| existing.photo_urls.clone())
        .into_iter()
        .filter(|url| !url.is_empty())
        .map(|url| storage.public_url(&url))
        .collect();
    photo_urls.extend(storage.upload_photos(&form.photos).await?);
    changes.photo_urls = apply_main_image_index(photo_urls, form.main_image_index())?;

    let location = if form.touches_location() {
        let stored = db
            .get_location(existing.location_id)
            .await
            .map_err(ApiError::internal("updating property"))?;
        let submitted = form.location_input();
        let input = match stored {
            Some(stored) => LocationInput {
                address: submitted.address.or(stored.address),
                city: submitted.city.or(stored.city),
                state: submitted.state.or(stored.state),
                country: submitted.country.or(stored.country),
                postal_code: submitted.postal_code.or(stored.postal_code),
                ..submitted
            },
            None => submitted,
        };
        Some(geocoder.resolve(input).await)
    } else {
        None
    };

    let details = db
        .update_property(&existing, changes, location)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                ApiError::not_found("Manager")
            } else {
                ApiError::internal("updating property")(err)
            }
        })?;

    Ok(HttpResponse::Ok().json(details))
}

#[delete("/properties/{id}")]
pub async fn delete_property(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager])?;

    let deleted = db
        .delete_property(id.into_inner())
        .await
        .map_err(ApiError::internal("deleting property"))?;
    if !deleted {
        return Err(ApiError::not_found("Property"));
    }

    Ok(HttpResponse::NoContent().finish())
}

// ============================================================================
// REVIEW & PROMOTION
// ============================================================================

#[patch("/properties/{id}/approve")]
pub async fn approve_property(
    db: web::Data<Database>,
    id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let property = db
        .approve_property(id.into_inner())
        .await
        .map_err(ApiError::internal("approving property"))?
        .ok_or_else(|| ApiError::not_found("Property"))?;

    Ok(HttpResponse::Ok().json(property))
}

#[patch("/properties/{id}/deny")]
pub async fn deny_property(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let reason = optional_json::<DenyPropertyRequest>(&req, &body)?.reason;
    let property = db
        .deny_property(id.into_inner(), reason)
        .await
        .map_err(ApiError::internal("denying property"))?
        .ok_or_else(|| ApiError::not_found("Property"))?;

    Ok(HttpResponse::Ok().json(property))
}

#[patch("/properties/{id}/feature")]
pub async fn feature_property(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let body: FeatureRequest = optional_json(&req, &body)?;
    promote(
        &db,
        id.into_inner(),
        Promotion::Featured,
        body.is_featured,
        body.featured_until,
        "featuring property",
    )
    .await
}

#[post("/properties/{id}/super-feature")]
pub async fn super_feature_property(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let body: SuperFeatureRequest = optional_json(&req, &body)?;
    promote(
        &db,
        id.into_inner(),
        Promotion::SuperFeatured,
        body.is_super_featured,
        body.super_featured_until,
        "super featuring property",
    )
    .await
}

async fn promote(
    db: &Database,
    id: i32,
    promotion: Promotion,
    flag: Option<Value>,
    until: Option<Value>,
    action: &'static str,
) -> Result<HttpResponse, ApiError> {
    let update = featuring::resolve(promotion, flag.as_ref(), until.as_ref())?;
    let property = db
        .apply_promotion(id, &update)
        .await
        .map_err(ApiError::internal(action))?
        .ok_or_else(|| ApiError::not_found("Property"))?;

    Ok(HttpResponse::Ok().json(property))
}

#[patch("/properties/{id}/availability")]
pub async fn set_property_availability(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let body: AvailabilityRequest = optional_json(&req, &body)?;
    let is_available = match body.is_available {
        Some(Value::Bool(value)) => value,
        _ => return Err(ApiError::BadRequest("Provide isAvailable as boolean".into())),
    };

    let property = db
        .set_availability(id.into_inner(), is_available)
        .await
        .map_err(ApiError::internal("updating property availability"))?
        .ok_or_else(|| ApiError::not_found("Property"))?;

    Ok(HttpResponse::Ok().json(property))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::{header::CONTENT_TYPE, StatusCode},
        test,
    };

    const BOUNDARY: &str = "madagou-form-boundary";

    async fn message(resp: actix_web::dev::ServiceResponse) -> String {
        let body: serde_json::Value = test::read_body_json(resp).await;
        body["message"].as_str().unwrap_or_default().to_string()
    }

    /// `multipart/form-data` body of text fields plus optional photo parts.
    fn form_body(fields: &[(&str, &str)], photos: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for file_name in photos {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photos\"; \
                     filename=\"{file_name}\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(&[0xff, 0xd8, 0xff, 0xd9]);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn villa_fields<'a>() -> Vec<(&'a str, &'a str)> {
        vec![
            ("name", "Villa Ivato"),
            ("description", "Three bedrooms near the airport"),
            ("beds", "3"),
            ("baths", "2"),
            ("squareFeet", "1400"),
            ("propertyType", "villa"),
            ("city", "Antananarivo"),
        ]
    }

    fn create_request(body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/properties")
            .insert_header(("X-Actor-Id", "mgr-1"))
            .insert_header(("X-Actor-Role", "manager"))
            .insert_header((
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    #[actix_rt::test]
    async fn nightly_listing_without_nightly_price_is_rejected() {
        let app = test_app!();
        let mut fields = villa_fields();
        fields.extend([("listingLabel", "night"), ("pricePerMonth", "900")]);

        let req = create_request(form_body(&fields, &[])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Night listings require pricePerNight");
    }

    #[actix_rt::test]
    async fn unknown_listing_label_is_rejected() {
        let app = test_app!();
        let mut fields = villa_fields();
        fields.extend([("listingLabel", "weekly"), ("pricePerNight", "45")]);

        let req = create_request(form_body(&fields, &[])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Invalid label. Use one of: monthly, night, sell");
    }

    #[actix_rt::test]
    async fn main_image_index_needs_photos() {
        let app = test_app!();
        let mut fields = villa_fields();
        fields.extend([("pricePerNight", "45"), ("mainImageIndex", "1")]);

        let req = create_request(form_body(&fields, &[])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Cannot set mainImageIndex when no photos are provided");

        let mut fields = villa_fields();
        fields.extend([("pricePerNight", "45"), ("mainImageIndex", "first")]);
        let req = create_request(form_body(&fields, &[])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "mainImageIndex must be a non-negative integer");
    }

    #[actix_rt::test]
    async fn photos_fail_cleanly_without_storage() {
        let app = test_app!();
        let mut fields = villa_fields();
        fields.push(("pricePerMonth", "900"));

        let body = form_body(&fields, &["front.jpg"]);
        let resp = test::call_service(&app, create_request(body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message(resp).await.starts_with("Error uploading photos"));
    }

    #[actix_rt::test]
    async fn oversized_text_fields_are_413() {
        let app = test_app!();
        let description = "a".repeat(70 * 1024);
        let mut fields = villa_fields();
        fields.retain(|(name, _)| *name != "description");
        fields.push(("description", description.as_str()));

        let req = create_request(form_body(&fields, &[])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_rt::test]
    async fn promotion_bodies_must_be_json() {
        let app = test_app!();
        let req = test::TestRequest::patch()
            .uri("/properties/4/feature")
            .insert_header((CONTENT_TYPE, "text/plain"))
            .set_payload(r#"{"isFeatured":false}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Content-Type must be application/json");

        let req = test::TestRequest::patch()
            .uri("/properties/4/deny")
            .insert_header((CONTENT_TYPE, "application/json"))
            .set_payload("{\"reason\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn invalid_search_filters_are_rejected_before_querying() {
        let app = test_app!();

        let req = test::TestRequest::get()
            .uri("/properties?listingLabel=weekly")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            message(resp).await,
            "Invalid listing label. Use one of: monthly, night, sell"
        );

        let req = test::TestRequest::get()
            .uri("/properties?priceMin=cheap")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "priceMin must be a number");
    }

    #[actix_rt::test]
    async fn writes_require_a_manager() {
        let app = test_app!();

        let req = test::TestRequest::delete().uri("/properties/4").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::delete()
            .uri("/properties/4")
            .insert_header(("X-Actor-Id", "tenant-sub"))
            .insert_header(("X-Actor-Role", "tenant"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn availability_needs_a_boolean() {
        let app = test_app!();
        let req = test::TestRequest::patch()
            .uri("/properties/4/availability")
            .set_json(serde_json::json!({ "isAvailable": "yes" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Provide isAvailable as boolean");
    }

    #[actix_rt::test]
    async fn feature_rejects_bad_dates_and_empty_requests() {
        let app = test_app!();

        let req = test::TestRequest::patch()
            .uri("/properties/4/feature")
            .set_json(serde_json::json!({ "featuredUntil": "someday" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(message(resp).await, "Invalid featuredUntil date");

        let req = test::TestRequest::post()
            .uri("/properties/4/super-feature")
            .set_json(serde_json::json!({ "isSuperFeatured": "on" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            message(resp).await,
            "Provide isSuperFeatured or superFeaturedUntil"
        );
    }
}
