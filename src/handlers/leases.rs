use actix_web::{get, web, HttpRequest, HttpResponse};

use super::{require_role, Role};
use crate::database::Database;
use crate::error::ApiError;

#[get("/leases")]
pub async fn list_leases(
    req: HttpRequest,
    db: web::Data<Database>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager, Role::Tenant])?;

    let leases = db
        .list_leases()
        .await
        .map_err(ApiError::internal("retrieving leases"))?;

    Ok(HttpResponse::Ok().json(leases))
}

#[get("/leases/{id}/payments")]
pub async fn list_lease_payments(
    req: HttpRequest,
    db: web::Data<Database>,
    id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    require_role(&req, &[Role::Manager, Role::Tenant])?;
    let id = id.into_inner();

    db.get_lease(id)
        .await
        .map_err(ApiError::internal("retrieving lease payments"))?
        .ok_or_else(|| ApiError::not_found("Lease"))?;
    let payments = db
        .list_payments(id)
        .await
        .map_err(ApiError::internal("retrieving lease payments"))?;

    Ok(HttpResponse::Ok().json(payments))
}
