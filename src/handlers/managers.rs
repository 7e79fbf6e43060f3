use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use validator::Validate;

use super::{query_params, require_role, Role};
use crate::database::{is_unique_violation, Database};
use crate::error::ApiError;
use crate::filters::{Predicate, PropertyFilter};
use crate::models::{CreateProfileRequest, UpdateProfileRequest};

/// Managers with property and application counts.
#[get("/managers")]
pub async fn list_managers(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    let pagination = query_params(&req)?.pagination();

    let (managers, total) = db
        .list_manager_summaries(&pagination)
        .await
        .map_err(ApiError::internal("retrieving managers"))?;

    Ok(HttpResponse::Ok().json(pagination.listing(managers, total)))
}

#[post("/managers")]
pub async fn create_manager(
    db: web::Data<Database>,
    payload: web::Json<CreateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    body.validate()?;

    let manager = db.create_manager(&body).await.map_err(|err| {
        if is_unique_violation(&err) {
            ApiError::Conflict("Manager already exists".into())
        } else {
            ApiError::internal("creating manager")(err)
        }
    })?;

    Ok(HttpResponse::Created().json(manager))
}

#[get("/managers/{cognito_id}")]
pub async fn get_manager(
    req: HttpRequest,
    db: web::Data<Database>,
    cognito_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager])?;

    let manager = db
        .get_manager(&cognito_id)
        .await
        .map_err(ApiError::internal("retrieving manager"))?
        .ok_or_else(|| ApiError::not_found("Manager"))?;

    Ok(HttpResponse::Ok().json(manager))
}

#[put("/managers/{cognito_id}")]
pub async fn update_manager(
    req: HttpRequest,
    db: web::Data<Database>,
    cognito_id: web::Path<String>,
    payload: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager])?;
    let body = payload.into_inner();
    body.validate()?;

    let manager = db
        .update_manager(&cognito_id, &body)
        .await
        .map_err(ApiError::internal("updating manager"))?
        .ok_or_else(|| ApiError::not_found("Manager"))?;

    Ok(HttpResponse::Ok().json(manager))
}

#[get("/managers/{cognito_id}/properties")]
pub async fn list_manager_properties(
    req: HttpRequest,
    db: web::Data<Database>,
    cognito_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager])?;
    let pagination = query_params(&req)?.pagination();
    let filter = PropertyFilter::only(Predicate::ManagedBy(cognito_id.into_inner()));

    let (properties, total) = db
        .search_properties(&filter, &pagination)
        .await
        .map_err(ApiError::internal("retrieving manager properties"))?;
    let properties: Vec<_> = properties
        .into_iter()
        .map(|mut details| {
            details.manager = None;
            details
        })
        .collect();

    Ok(HttpResponse::Ok().json(pagination.listing(properties, total)))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};

    #[actix_rt::test]
    async fn profile_routes_need_a_manager() {
        let app = test_app!();

        let req = test::TestRequest::get().uri("/managers/mgr-1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/managers/mgr-1/properties")
            .insert_header(("X-Actor-Id", "tenant-1"))
            .insert_header(("X-Actor-Role", "tenant"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Access denied");
    }

    #[actix_rt::test]
    async fn create_validates_the_profile() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/managers")
            .set_json(serde_json::json!({
                "cognitoId": "mgr-1",
                "name": "Hery",
                "email": "not-an-email"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("Validation failed"));
    }

    #[actix_rt::test]
    async fn malformed_json_is_a_bad_request() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/managers")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"cognitoId\":")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
