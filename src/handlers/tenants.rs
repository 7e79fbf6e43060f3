use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use validator::Validate;

use super::{query_params, require_role, Role};
use crate::database::{is_foreign_key_violation, is_unique_violation, Database};
use crate::error::ApiError;
use crate::filters::{Predicate, PropertyFilter};
use crate::models::{CreateProfileRequest, Tenant, UpdateProfileRequest};

#[post("/tenants")]
pub async fn create_tenant(
    db: web::Data<Database>,
    payload: web::Json<CreateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    body.validate()?;

    let tenant = db.create_tenant(&body).await.map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::Conflict("Tenant already exists".into())
        } else {
            ApiError::internal("creating tenant")(err)
        }
    })?;

    Ok(HttpResponse::Created().json(tenant))
}

/// Tenant profile including favorite properties.
#[get("/tenants/{cognito_id}")]
pub async fn get_tenant(
    req: HttpRequest,
    db: web::Data<Database>,
    cognito_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Tenant])?;

    let tenant = db
        .get_tenant_with_favorites(&cognito_id)
        .await
        .map_err(ApiError::internal("retrieving tenant"))?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;

    Ok(HttpResponse::Ok().json(tenant))
}

#[put("/tenants/{cognito_id}")]
pub async fn update_tenant(
    req: HttpRequest,
    db: web::Data<Database>,
    cognito_id: web::Path<String>,
    payload: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Tenant])?;
    let body = payload.into_inner();
    body.validate()?;

    let tenant = db
        .update_tenant(&cognito_id, &body)
        .await
        .map_err(ApiError::internal("updating tenant"))?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;

    Ok(HttpResponse::Ok().json(tenant))
}

/// Properties the tenant currently occupies.
#[get("/tenants/{cognito_id}/current-residences")]
pub async fn list_current_residences(
    req: HttpRequest,
    db: web::Data<Database>,
    cognito_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Tenant])?;
    let pagination = query_params(&req)?.pagination();
    let filter = PropertyFilter::only(Predicate::OccupiedBy(cognito_id.into_inner()));

    let (properties, total) = db
        .search_properties(&filter, &pagination)
        .await
        .map_err(ApiError::internal("retrieving current residences"))?;
    let properties: Vec<_> = properties
        .into_iter()
        .map(|mut details| {
            details.manager = None;
            details
        })
        .collect();

    Ok(HttpResponse::Ok().json(pagination.listing(properties, total)))
}

// ============================================================================
// FAVORITES
// ============================================================================

async fn find_tenant(
    db: &Database,
    cognito_id: &str,
    action: &'static str,
) -> Result<Tenant, ApiError> {
    db.get_tenant(cognito_id)
        .await
        .map_err(ApiError::internal(action))?
        .ok_or_else(|| ApiError::not_found("Tenant"))
}

#[post("/tenants/{cognito_id}/favorites/{property_id}")]
pub async fn add_favorite_property(
    req: HttpRequest,
    db: web::Data<Database>,
    path: web::Path<(String, i32)>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Tenant])?;
    let (cognito_id, property_id) = path.into_inner();
    let tenant = find_tenant(&db, &cognito_id, "adding favorite property").await?;

    let added = db.add_favorite(tenant.id, property_id).await.map_err(|err| {
        if is_foreign_key_violation(&err) {
            ApiError::not_found("Property")
        } else {
            ApiError::internal("adding favorite property")(err)
        }
    })?;
    if !added {
        return Err(ApiError::Conflict("Property already added as favorite".into()));
    }

    let tenant = db
        .with_favorites(tenant)
        .await
        .map_err(ApiError::internal("adding favorite property"))?;
    Ok(HttpResponse::Ok().json(tenant))
}

#[delete("/tenants/{cognito_id}/favorites/{property_id}")]
pub async fn remove_favorite_property(
    req: HttpRequest,
    db: web::Data<Database>,
    path: web::Path<(String, i32)>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Tenant])?;
    let (cognito_id, property_id) = path.into_inner();
    let tenant = find_tenant(&db, &cognito_id, "removing favorite property").await?;

    db.remove_favorite(tenant.id, property_id)
        .await
        .map_err(ApiError::internal("removing favorite property"))?;

    let tenant = db
        .with_favorites(tenant)
        .await
        .map_err(ApiError::internal("removing favorite property"))?;
    Ok(HttpResponse::Ok().json(tenant))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};

    #[actix_rt::test]
    async fn tenant_routes_reject_managers() {
        let app = test_app!();

        for req in [
            test::TestRequest::get().uri("/tenants/t-1"),
            test::TestRequest::get().uri("/tenants/t-1/current-residences"),
            test::TestRequest::post().uri("/tenants/t-1/favorites/3"),
            test::TestRequest::delete().uri("/tenants/t-1/favorites/3"),
        ] {
            let req = req
                .insert_header(("X-Actor-Id", "mgr-1"))
                .insert_header(("X-Actor-Role", "manager"))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        }
    }

    #[actix_rt::test]
    async fn missing_role_header_is_unauthorized() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/tenants/t-1/favorites/3")
            .insert_header(("X-Actor-Id", "t-1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Missing or invalid X-Actor-Role header");
    }

    #[actix_rt::test]
    async fn update_validates_email() {
        let app = test_app!();
        let req = test::TestRequest::put()
            .uri("/tenants/t-1")
            .insert_header(("X-Actor-Id", "t-1"))
            .insert_header(("X-Actor-Role", "tenant"))
            .set_json(serde_json::json!({ "email": "nope" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
