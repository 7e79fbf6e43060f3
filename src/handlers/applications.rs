use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use validator::Validate;

use super::{query_params, require_role, Role};
use crate::database::{ApplicationScope, Approval, Database};
use crate::error::ApiError;
use crate::leasing::{admit_application, lease_terms};
use crate::models::{
    Application, ApplicationStatus, ApplicationStatusRequest, CreateApplicationRequest,
    NewApplication,
};

/// `userId` + `userType` narrow the list to one tenant or one manager's
/// properties. Without both every application is returned.
#[get("/applications")]
pub async fn list_applications(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager, Role::Tenant])?;
    let params = query_params(&req)?;
    let pagination = params.pagination();

    let scope = match (params.first("userId"), params.first("userType")) {
        (Some(user_id), Some(user_type)) if !user_id.trim().is_empty() => {
            match user_type.trim().to_ascii_lowercase().as_str() {
                "tenant" => Some(ApplicationScope::Tenant(user_id.trim().to_string())),
                "manager" => Some(ApplicationScope::Manager(user_id.trim().to_string())),
                _ => None,
            }
        }
        _ => None,
    };

    let (applications, total) = db
        .list_applications(scope.as_ref(), &pagination)
        .await
        .map_err(ApiError::internal("retrieving applications"))?;

    Ok(HttpResponse::Ok().json(pagination.listing(applications, total)))
}

#[post("/applications")]
pub async fn create_application(
    req: HttpRequest,
    db: web::Data<Database>,
    payload: web::Json<CreateApplicationRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Tenant])?;
    let body = payload.into_inner();
    body.validate()?;

    let property = db
        .get_property(body.property_id)
        .await
        .map_err(ApiError::internal("creating application"))?
        .ok_or_else(|| ApiError::not_found("Property"))?;
    let stay_days = admit_application(
        property.listing_label,
        &property.pricing(),
        body.stay_days.as_ref(),
    )?;

    db.get_tenant(&body.tenant_cognito_id)
        .await
        .map_err(ApiError::internal("creating application"))?
        .ok_or_else(|| ApiError::not_found("Tenant"))?;

    let application = db
        .create_application(NewApplication {
            application_date: body.application_date.unwrap_or_else(Utc::now),
            property_id: property.id,
            tenant_cognito_id: body.tenant_cognito_id,
            name: body.name,
            email: body.email,
            phone_number: body.phone_number,
            message: body.message,
            stay_days,
        })
        .await
        .map_err(ApiError::internal("creating application"))?;

    let decision = db
        .application_decision(application)
        .await
        .map_err(ApiError::internal("creating application"))?;
    Ok(HttpResponse::Created().json(decision))
}

/// Approving creates the lease and moves the tenant in.
#[put("/applications/{id}/status")]
pub async fn update_application_status(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
    payload: web::Json<ApplicationStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager])?;
    let status = payload.into_inner().status;

    let application = db
        .get_application(id.into_inner())
        .await
        .map_err(ApiError::internal("updating application status"))?
        .ok_or_else(|| ApiError::NotFound("Application not found.".into()))?;

    let application = match status {
        ApplicationStatus::Approved => {
            let property = db
                .get_property(application.property_id)
                .await
                .map_err(ApiError::internal("updating application status"))?
                .ok_or_else(|| ApiError::not_found("Property"))?;
            let terms = lease_terms(&property, application.stay_days, Utc::now())?;

            let approval = db
                .approve_application(&application, &terms)
                .await
                .map_err(ApiError::internal("updating application status"))?;
            approved_application(approval)?
        }
        other => db
            .set_application_status(application.id, other)
            .await
            .map_err(ApiError::internal("updating application status"))?
            .ok_or_else(|| ApiError::NotFound("Application not found.".into()))?,
    };

    let decision = db
        .application_decision(application)
        .await
        .map_err(ApiError::internal("updating application status"))?;
    Ok(HttpResponse::Ok().json(decision))
}

fn approved_application(approval: Approval) -> Result<Application, ApiError> {
    match approval {
        Approval::Approved(application) => Ok(application),
        Approval::AlreadyLeased(lease_id) => Err(ApiError::Conflict(format!(
            "Application already has lease {lease_id}"
        ))),
        Approval::Missing => Err(ApiError::NotFound("Application not found.".into())),
    }
}
