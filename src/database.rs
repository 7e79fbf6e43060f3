use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    time::Duration,
};

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgRow},
    Connection, Executor, FromRow, PgPool, Postgres, QueryBuilder, Row,
};

use crate::clients::geocoding::ResolvedLocation;
use crate::featuring::{Expiry, PromotionUpdate};
use crate::filters::PropertyFilter;
use crate::leasing::LeaseTerms;
use crate::models::{
    Application, ApplicationDecision, ApplicationListItem, ApplicationProperty, ApplicationStatus,
    ApprovalStatus, Coordinates, CreateProfileRequest, LocationView, Lease, LeaseDetails, Manager,
    ManagerSummary, NewApplication, NewProperty, Payment, Property, PropertyChanges,
    PropertyDetails, Tenant, TenantWithFavorites, UpdateProfileRequest,
};
use crate::pagination::Pagination;

/// Property columns followed by its location and manager, as read by
/// [`property_details_from_row`].
pub const PROPERTY_DETAIL_COLUMNS: &str = "p.*, \
     l.address, l.city, l.state, l.country, l.postal_code, \
     ST_X(l.coordinates::geometry) AS longitude, \
     ST_Y(l.coordinates::geometry) AS latitude, \
     m.id AS manager_id, m.name AS manager_name, m.email AS manager_email, \
     m.phone_number AS manager_phone_number";

pub const PROPERTY_JOINS: &str = " FROM properties p \
     JOIN locations l ON p.location_id = l.id \
     JOIN managers m ON p.manager_cognito_id = m.cognito_id";

/// Whose applications to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationScope {
    Tenant(String),
    Manager(String),
}

/// Outcome of [`Database::approve_application`].
#[derive(Debug)]
pub enum Approval {
    Approved(Application),
    AlreadyLeased(i32),
    Missing,
}

const LOCK_APPLICATION: &str = "SELECT lease_id FROM applications WHERE id = $1 FOR UPDATE";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = match pool_options().connect(database_url).await {
            Ok(pool) => pool,
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("3D000")) => {
                log::info!("Database missing, attempting to create it");
                create_database_if_missing(database_url).await?;
                pool_options().connect(database_url).await?
            }
            Err(err) => return Err(err),
        };

        // Run embedded migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // PROPERTIES
    // ========================================================================

    /// Matching rows plus the total row count. The count only runs for
    /// paginated requests.
    pub async fn search_properties(
        &self,
        filter: &PropertyFilter,
        pagination: &Pagination,
    ) -> Result<(Vec<PropertyDetails>, i64), sqlx::Error> {
        let mut query = filter.search_query(pagination);
        let rows = query.build().fetch_all(&self.pool).await?;
        let properties = rows
            .iter()
            .map(property_details_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let total = if pagination.paginate {
            let mut count = filter.count_query();
            count.build_query_scalar::<i64>().fetch_one(&self.pool).await?
        } else {
            properties.len() as i64
        };

        Ok((properties, total))
    }

    pub async fn get_property(&self, id: i32) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_property_details(
        &self,
        id: i32,
    ) -> Result<Option<PropertyDetails>, sqlx::Error> {
        let sql = format!("SELECT {PROPERTY_DETAIL_COLUMNS}{PROPERTY_JOINS} WHERE p.id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(property_details_from_row).transpose()
    }

    pub async fn get_location(&self, id: i32) -> Result<Option<LocationView>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                id AS location_id,
                address,
                city,
                state,
                country,
                postal_code,
                ST_X(coordinates::geometry) AS longitude,
                ST_Y(coordinates::geometry) AS latitude
            FROM locations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(location_from_row).transpose()
    }

    pub async fn create_property(
        &self,
        property: NewProperty,
        location: ResolvedLocation,
    ) -> Result<PropertyDetails, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let location_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO locations (address, city, state, country, postal_code, coordinates)
            VALUES ($1, $2, $3, $4, $5, ST_SetSRID(ST_MakePoint($6, $7), 4326)::geography)
            RETURNING id
            "#,
        )
        .bind(&location.address)
        .bind(&location.city)
        .bind(&location.state)
        .bind(&location.country)
        .bind(&location.postal_code)
        .bind(location.coordinates.longitude)
        .bind(location.coordinates.latitude)
        .fetch_one(tx.as_mut())
        .await?;

        let NewProperty {
            name,
            description,
            listing_label,
            price_per_month,
            price_per_night,
            price_total,
            security_deposit,
            application_fee,
            photo_urls,
            amenities,
            highlights,
            is_pets_allowed,
            is_parking_included,
            beds,
            baths,
            square_feet,
            property_type,
            manager_cognito_id,
        } = property;

        let property_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO properties (
                name,
                description,
                listing_label,
                price_per_month,
                price_per_night,
                price_total,
                security_deposit,
                application_fee,
                photo_urls,
                amenities,
                highlights,
                is_pets_allowed,
                is_parking_included,
                beds,
                baths,
                square_feet,
                property_type,
                is_approved,
                location_id,
                manager_cognito_id
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(listing_label)
        .bind(price_per_month)
        .bind(price_per_night)
        .bind(price_total)
        .bind(security_deposit)
        .bind(application_fee)
        .bind(photo_urls)
        .bind(amenities)
        .bind(highlights)
        .bind(is_pets_allowed)
        .bind(is_parking_included)
        .bind(beds)
        .bind(baths)
        .bind(square_feet)
        .bind(property_type)
        .bind(ApprovalStatus::Pending)
        .bind(location_id)
        .bind(manager_cognito_id)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;

        self.get_property_details(property_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Applies a manager edit and puts the listing back into review.
    pub async fn update_property(
        &self,
        existing: &Property,
        changes: PropertyChanges,
        location: Option<ResolvedLocation>,
    ) -> Result<PropertyDetails, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if let Some(location) = location {
            location_update(location, existing.location_id)
                .build()
                .execute(tx.as_mut())
                .await?;
        }

        let PropertyChanges {
            name,
            description,
            pricing,
            security_deposit,
            application_fee,
            beds,
            baths,
            square_feet,
            property_type,
            is_pets_allowed,
            is_parking_included,
            amenities,
            highlights,
            photo_urls,
            manager_cognito_id,
        } = changes;

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE properties SET ");
        {
            let mut set = qb.separated(", ");
            set.push("photo_urls = ").push_bind_unseparated(photo_urls);
            set.push("manager_cognito_id = ").push_bind_unseparated(manager_cognito_id);
            set.push("is_approved = ").push_bind_unseparated(ApprovalStatus::Pending);

            if let Some(name) = name {
                set.push("name = ").push_bind_unseparated(name);
            }
            if let Some(description) = description {
                set.push("description = ").push_bind_unseparated(description);
            }
            if let Some((label, prices)) = pricing {
                set.push("listing_label = ").push_bind_unseparated(label);
                set.push("price_per_month = ").push_bind_unseparated(prices.price_per_month);
                set.push("price_per_night = ").push_bind_unseparated(prices.price_per_night);
                set.push("price_total = ").push_bind_unseparated(prices.price_total);
            }
            if let Some(value) = security_deposit {
                set.push("security_deposit = ").push_bind_unseparated(value);
            }
            if let Some(value) = application_fee {
                set.push("application_fee = ").push_bind_unseparated(value);
            }
            if let Some(value) = beds {
                set.push("beds = ").push_bind_unseparated(value);
            }
            if let Some(value) = baths {
                set.push("baths = ").push_bind_unseparated(value);
            }
            if let Some(value) = square_feet {
                set.push("square_feet = ").push_bind_unseparated(value);
            }
            if let Some(value) = property_type {
                set.push("property_type = ").push_bind_unseparated(value);
            }
            if let Some(value) = is_pets_allowed {
                set.push("is_pets_allowed = ").push_bind_unseparated(value);
            }
            if let Some(value) = is_parking_included {
                set.push("is_parking_included = ").push_bind_unseparated(value);
            }
            if let Some(value) = amenities {
                set.push("amenities = ").push_bind_unseparated(value);
            }
            if let Some(value) = highlights {
                set.push("highlights = ").push_bind_unseparated(value);
            }
        }
        qb.push(" WHERE id = ").push_bind(existing.id);
        qb.build().execute(tx.as_mut()).await?;

        tx.commit().await?;

        self.get_property_details(existing.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Removes the property with its payments, applications and leases, and
    /// its location once nothing else points at it. `false` if it did not exist.
    pub async fn delete_property(&self, id: i32) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let location_id: Option<i32> =
            sqlx::query_scalar("SELECT location_id FROM properties WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(tx.as_mut())
                .await?;
        let Some(location_id) = location_id else {
            return Ok(false);
        };

        sqlx::query(
            "DELETE FROM payments WHERE lease_id IN (SELECT id FROM leases WHERE property_id = $1)",
        )
        .bind(id)
        .execute(tx.as_mut())
        .await?;
        sqlx::query("DELETE FROM applications WHERE property_id = $1")
            .bind(id)
            .execute(tx.as_mut())
            .await?;
        sqlx::query("DELETE FROM leases WHERE property_id = $1")
            .bind(id)
            .execute(tx.as_mut())
            .await?;
        sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(tx.as_mut())
            .await?;

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM properties WHERE location_id = $1")
                .bind(location_id)
                .fetch_one(tx.as_mut())
                .await?;
        if remaining == 0 {
            sqlx::query("DELETE FROM locations WHERE id = $1")
                .bind(location_id)
                .execute(tx.as_mut())
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn approve_property(&self, id: i32) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            "UPDATE properties SET is_approved = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(ApprovalStatus::Approved)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn deny_property(
        &self,
        id: i32,
        reason: Option<String>,
    ) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            "UPDATE properties SET is_approved = $2, denied_reason = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(ApprovalStatus::Denied)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn apply_promotion(
        &self,
        id: i32,
        update: &PromotionUpdate,
    ) -> Result<Option<Property>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE properties SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(flag) = update.flag {
                set.push(update.promotion.flag_column())
                    .push_unseparated(" = ")
                    .push_bind_unseparated(flag);
            }
            match update.until {
                Expiry::Keep => {}
                Expiry::Clear => {
                    set.push(update.promotion.until_column())
                        .push_unseparated(" = NULL");
                }
                Expiry::Set(until) => {
                    set.push(update.promotion.until_column())
                        .push_unseparated(" = ")
                        .push_bind_unseparated(until);
                }
            }
        }
        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        qb.build_query_as::<Property>()
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn set_availability(
        &self,
        id: i32,
        is_available: bool,
    ) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            "UPDATE properties SET is_available = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_available)
        .fetch_optional(&self.pool)
        .await
    }

    async fn property_details_by_ids(
        &self,
        ids: &[i32],
    ) -> Result<HashMap<i32, PropertyDetails>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!("SELECT {PROPERTY_DETAIL_COLUMNS}{PROPERTY_JOINS} WHERE p.id = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(dedupe(ids))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| property_details_from_row(row).map(|details| (details.property.id, details)))
            .collect()
    }

    async fn properties_by_ids(&self, ids: &[i32]) -> Result<HashMap<i32, Property>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let properties =
            sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = ANY($1)")
                .bind(dedupe(ids))
                .fetch_all(&self.pool)
                .await?;
        Ok(properties.into_iter().map(|p| (p.id, p)).collect())
    }

    // ========================================================================
    // MANAGERS & TENANTS
    // ========================================================================

    pub async fn create_manager(
        &self,
        profile: &CreateProfileRequest,
    ) -> Result<Manager, sqlx::Error> {
        self.insert_profile("managers", profile).await
    }

    pub async fn get_manager(&self, cognito_id: &str) -> Result<Option<Manager>, sqlx::Error> {
        sqlx::query_as::<_, Manager>("SELECT * FROM managers WHERE cognito_id = $1")
            .bind(cognito_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_manager(
        &self,
        cognito_id: &str,
        changes: &UpdateProfileRequest,
    ) -> Result<Option<Manager>, sqlx::Error> {
        self.update_profile("managers", cognito_id, changes).await
    }

    /// Managers with their property and application counts, newest first.
    pub async fn list_manager_summaries(
        &self,
        pagination: &Pagination,
    ) -> Result<(Vec<ManagerSummary>, i64), sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                m.id,
                m.cognito_id,
                m.name,
                m.email,
                m.phone_number,
                COUNT(DISTINCT p.id)::int AS property_count,
                COUNT(a.id)::int AS application_count
            FROM managers m
            LEFT JOIN properties p ON p.manager_cognito_id = m.cognito_id
            LEFT JOIN applications a ON a.property_id = p.id
            GROUP BY m.id
            ORDER BY m.id DESC
            "#,
        );
        push_page(&mut qb, pagination);

        let managers = qb
            .build_query_as::<ManagerSummary>()
            .fetch_all(&self.pool)
            .await?;

        let total = if pagination.paginate {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM managers")
                .fetch_one(&self.pool)
                .await?
        } else {
            managers.len() as i64
        };

        Ok((managers, total))
    }

    pub async fn create_tenant(
        &self,
        profile: &CreateProfileRequest,
    ) -> Result<Tenant, sqlx::Error> {
        self.insert_profile("tenants", profile).await
    }

    pub async fn get_tenant(&self, cognito_id: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE cognito_id = $1")
            .bind(cognito_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn update_tenant(
        &self,
        cognito_id: &str,
        changes: &UpdateProfileRequest,
    ) -> Result<Option<Tenant>, sqlx::Error> {
        self.update_profile("tenants", cognito_id, changes).await
    }

    pub async fn get_tenant_with_favorites(
        &self,
        cognito_id: &str,
    ) -> Result<Option<TenantWithFavorites>, sqlx::Error> {
        let Some(tenant) = self.get_tenant(cognito_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.with_favorites(tenant).await?))
    }

    pub async fn with_favorites(&self, tenant: Tenant) -> Result<TenantWithFavorites, sqlx::Error> {
        let favorites = sqlx::query_as::<_, Property>(
            r#"
            SELECT p.*
            FROM properties p
            JOIN tenant_favorites f ON f.property_id = p.id
            WHERE f.tenant_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(tenant.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(TenantWithFavorites { tenant, favorites })
    }

    /// `false` when the property was already a favorite.
    pub async fn add_favorite(
        &self,
        tenant_id: i32,
        property_id: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO tenant_favorites (tenant_id, property_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(tenant_id)
        .bind(property_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_favorite(
        &self,
        tenant_id: i32,
        property_id: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tenant_favorites WHERE tenant_id = $1 AND property_id = $2")
            .bind(tenant_id)
            .bind(property_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_profile<T>(
        &self,
        table: &'static str,
        profile: &CreateProfileRequest,
    ) -> Result<T, sqlx::Error>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!(
            "INSERT INTO {table} (cognito_id, name, email, phone_number) \
             VALUES ($1, $2, $3, $4) RETURNING *"
        );
        sqlx::query_as::<_, T>(&sql)
            .bind(&profile.cognito_id)
            .bind(&profile.name)
            .bind(&profile.email)
            .bind(&profile.phone_number)
            .fetch_one(&self.pool)
            .await
    }

    async fn update_profile<T>(
        &self,
        table: &'static str,
        cognito_id: &str,
        changes: &UpdateProfileRequest,
    ) -> Result<Option<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!(
            r#"
            UPDATE {table}
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone_number = COALESCE($4, phone_number)
            WHERE cognito_id = $1
            RETURNING *
            "#
        );
        sqlx::query_as::<_, T>(&sql)
            .bind(cognito_id)
            .bind(&changes.name)
            .bind(&changes.email)
            .bind(&changes.phone_number)
            .fetch_optional(&self.pool)
            .await
    }

    async fn tenants_by_cognito_ids(
        &self,
        cognito_ids: &[String],
    ) -> Result<HashMap<String, Tenant>, sqlx::Error> {
        if cognito_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let tenants =
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE cognito_id = ANY($1)")
                .bind(dedupe(cognito_ids))
                .fetch_all(&self.pool)
                .await?;
        Ok(tenants
            .into_iter()
            .map(|tenant| (tenant.cognito_id.clone(), tenant))
            .collect())
    }

    // ========================================================================
    // APPLICATIONS
    // ========================================================================

    pub async fn list_applications(
        &self,
        scope: Option<&ApplicationScope>,
        pagination: &Pagination,
    ) -> Result<(Vec<ApplicationListItem>, i64), sqlx::Error> {
        let mut qb = applications_query("SELECT a.*", scope);
        qb.push(" ORDER BY a.application_date DESC");
        push_page(&mut qb, pagination);

        let applications = qb
            .build_query_as::<Application>()
            .fetch_all(&self.pool)
            .await?;

        let total = if pagination.paginate {
            let mut count = applications_query("SELECT COUNT(*)", scope);
            count.build_query_scalar::<i64>().fetch_one(&self.pool).await?
        } else {
            applications.len() as i64
        };

        let property_ids: Vec<i32> = applications.iter().map(|a| a.property_id).collect();
        let tenant_ids: Vec<String> = applications
            .iter()
            .map(|a| a.tenant_cognito_id.clone())
            .collect();
        let properties = self.property_details_by_ids(&property_ids).await?;
        let tenants = self.tenants_by_cognito_ids(&tenant_ids).await?;

        let items = applications
            .into_iter()
            .filter_map(|application| {
                let details = properties.get(&application.property_id).cloned();
                let tenant = tenants.get(&application.tenant_cognito_id).cloned();
                match (details, tenant) {
                    (Some(details), Some(tenant)) => {
                        let manager = details.manager?;
                        Some(ApplicationListItem {
                            property: ApplicationProperty {
                                address: details.location.address.clone(),
                                location: details.location,
                                property: details.property,
                            },
                            tenant,
                            manager,
                            application,
                        })
                    }
                    _ => {
                        log::warn!(
                            "Skipping application {} with missing relations",
                            application.id
                        );
                        None
                    }
                }
            })
            .collect();

        Ok((items, total))
    }

    pub async fn get_application(&self, id: i32) -> Result<Option<Application>, sqlx::Error> {
        sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn create_application(
        &self,
        application: NewApplication,
    ) -> Result<Application, sqlx::Error> {
        let NewApplication {
            application_date,
            property_id,
            tenant_cognito_id,
            name,
            email,
            phone_number,
            message,
            stay_days,
        } = application;

        sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (
                application_date,
                status,
                property_id,
                tenant_cognito_id,
                name,
                email,
                phone_number,
                message,
                stay_days
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(application_date)
        .bind(ApplicationStatus::Pending)
        .bind(property_id)
        .bind(tenant_cognito_id)
        .bind(name)
        .bind(email)
        .bind(phone_number)
        .bind(message)
        .bind(stay_days)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn set_application_status(
        &self,
        id: i32,
        status: ApplicationStatus,
    ) -> Result<Option<Application>, sqlx::Error> {
        sqlx::query_as::<_, Application>(
            "UPDATE applications SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
    }

    /// Creates the lease, moves the tenant in and approves the application
    /// in a single transaction. The application row stays locked until
    /// commit, so only one approval can create its lease.
    pub async fn approve_application(
        &self,
        application: &Application,
        terms: &LeaseTerms,
    ) -> Result<Approval, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let current_lease: Option<Option<i32>> = sqlx::query_scalar(LOCK_APPLICATION)
            .bind(application.id)
            .fetch_optional(tx.as_mut())
            .await?;
        match current_lease {
            None => return Ok(Approval::Missing),
            Some(Some(lease_id)) => return Ok(Approval::AlreadyLeased(lease_id)),
            Some(None) => {}
        }

        let lease = sqlx::query_as::<_, Lease>(
            r#"
            INSERT INTO leases (start_date, end_date, rent, deposit, property_id, tenant_cognito_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(terms.start_date)
        .bind(terms.end_date)
        .bind(terms.rent)
        .bind(terms.deposit)
        .bind(application.property_id)
        .bind(&application.tenant_cognito_id)
        .fetch_one(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO property_tenants (tenant_id, property_id)
            SELECT t.id, $1 FROM tenants t WHERE t.cognito_id = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(application.property_id)
        .bind(&application.tenant_cognito_id)
        .execute(tx.as_mut())
        .await?;

        let approved = sqlx::query_as::<_, Application>(
            "UPDATE applications SET status = $2, lease_id = $3 WHERE id = $1 RETURNING *",
        )
        .bind(application.id)
        .bind(ApplicationStatus::Approved)
        .bind(lease.id)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(Approval::Approved(approved))
    }

    /// Application with its property, tenant and lease.
    pub async fn application_decision(
        &self,
        application: Application,
    ) -> Result<ApplicationDecision, sqlx::Error> {
        let property = self
            .get_property(application.property_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let tenant = self
            .get_tenant(&application.tenant_cognito_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        let lease = match application.lease_id {
            Some(lease_id) => self.get_lease(lease_id).await?,
            None => None,
        };

        Ok(ApplicationDecision {
            application,
            property,
            tenant,
            lease,
        })
    }

    // ========================================================================
    // LEASES & PAYMENTS
    // ========================================================================

    pub async fn get_lease(&self, id: i32) -> Result<Option<Lease>, sqlx::Error> {
        sqlx::query_as::<_, Lease>("SELECT * FROM leases WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_leases(&self) -> Result<Vec<LeaseDetails>, sqlx::Error> {
        let leases = sqlx::query_as::<_, Lease>("SELECT * FROM leases ORDER BY start_date DESC")
            .fetch_all(&self.pool)
            .await?;

        let property_ids: Vec<i32> = leases.iter().map(|lease| lease.property_id).collect();
        let tenant_ids: Vec<String> = leases
            .iter()
            .map(|lease| lease.tenant_cognito_id.clone())
            .collect();
        let properties = self.properties_by_ids(&property_ids).await?;
        let tenants = self.tenants_by_cognito_ids(&tenant_ids).await?;

        Ok(leases
            .into_iter()
            .filter_map(|lease| {
                let property = properties.get(&lease.property_id)?.clone();
                let tenant = tenants.get(&lease.tenant_cognito_id)?.clone();
                Some(LeaseDetails {
                    lease,
                    tenant,
                    property,
                })
            })
            .collect())
    }

    pub async fn list_payments(&self, lease_id: i32) -> Result<Vec<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE lease_id = $1 ORDER BY due_date")
            .bind(lease_id)
            .fetch_all(&self.pool)
            .await
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(600)))
        .test_before_acquire(true)
}

/// `UPDATE locations` for a re-geocoded address. Unknown `(0, 0)`
/// coordinates leave the stored point alone.
fn location_update(
    location: ResolvedLocation,
    location_id: i32,
) -> QueryBuilder<'static, Postgres> {
    let move_point = location.has_coordinates();
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE locations SET ");
    {
        let mut set = qb.separated(", ");
        set.push("address = ").push_bind_unseparated(location.address);
        set.push("city = ").push_bind_unseparated(location.city);
        set.push("state = ").push_bind_unseparated(location.state);
        set.push("country = ").push_bind_unseparated(location.country);
        set.push("postal_code = ").push_bind_unseparated(location.postal_code);
        if move_point {
            set.push("coordinates = ST_SetSRID(ST_MakePoint(")
                .push_bind_unseparated(location.coordinates.longitude)
                .push_unseparated(", ")
                .push_bind_unseparated(location.coordinates.latitude)
                .push_unseparated("), 4326)::geography");
        }
    }
    qb.push(" WHERE id = ").push_bind(location_id);
    qb
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, pagination: &Pagination) {
    if pagination.paginate {
        qb.push(" LIMIT ")
            .push_bind(pagination.limit)
            .push(" OFFSET ")
            .push_bind(pagination.offset);
    }
}

/// Applications whose property, location, manager and tenant all exist, so
/// the count matches the rows that can be assembled.
const APPLICATION_JOINS: &str = " FROM applications a \
     JOIN properties p ON a.property_id = p.id \
     JOIN locations l ON p.location_id = l.id \
     JOIN managers m ON p.manager_cognito_id = m.cognito_id \
     JOIN tenants t ON a.tenant_cognito_id = t.cognito_id";

fn applications_query(
    select: &str,
    scope: Option<&ApplicationScope>,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(select);
    qb.push(APPLICATION_JOINS);
    push_application_scope(&mut qb, scope);
    qb
}

fn push_application_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: Option<&ApplicationScope>) {
    match scope {
        Some(ApplicationScope::Tenant(cognito_id)) => {
            qb.push(" WHERE a.tenant_cognito_id = ").push_bind(cognito_id.clone());
        }
        Some(ApplicationScope::Manager(cognito_id)) => {
            qb.push(" WHERE p.manager_cognito_id = ").push_bind(cognito_id.clone());
        }
        None => {}
    }
}

fn dedupe<T: Clone + Eq + std::hash::Hash>(values: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|value| seen.insert((*value).clone()))
        .cloned()
        .collect()
}

fn location_from_row(row: &PgRow) -> Result<LocationView, sqlx::Error> {
    Ok(LocationView {
        id: row.try_get("location_id")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        country: row.try_get("country")?,
        postal_code: row.try_get("postal_code")?,
        coordinates: Coordinates {
            longitude: row.try_get("longitude")?,
            latitude: row.try_get("latitude")?,
        },
    })
}

/// Reads a row selected with [`PROPERTY_DETAIL_COLUMNS`].
fn property_details_from_row(row: &PgRow) -> Result<PropertyDetails, sqlx::Error> {
    let property = Property::from_row(row)?;
    let location = location_from_row(row)?;
    let manager = Manager {
        id: row.try_get("manager_id")?,
        cognito_id: property.manager_cognito_id.clone(),
        name: row.try_get("manager_name")?,
        email: row.try_get("manager_email")?,
        phone_number: row.try_get("manager_phone_number")?,
    };

    Ok(PropertyDetails {
        property,
        location,
        manager: Some(manager),
    })
}

/// Postgres `unique_violation`.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code() == Some(Cow::Borrowed("23505")))
}

/// Postgres `foreign_key_violation`.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code() == Some(Cow::Borrowed("23503")))
}

async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = database_url.parse()?;
    let database_name = options
        .get_database()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "postgres".to_string());

    // Already pointing at the maintenance database.
    if database_name.eq_ignore_ascii_case("postgres") {
        return Ok(());
    }

    let maintenance_options = options.clone().database("postgres");
    let mut connection = sqlx::postgres::PgConnection::connect_with(&maintenance_options).await?;

    let create_stmt = format!("CREATE DATABASE \"{}\"", database_name.replace('"', "\"\""));

    match connection.execute(create_stmt.as_str()).await {
        Ok(_) => {
            log::info!("Created database '{}'", database_name);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("42P04")) => {
            log::info!("Database '{}' already exists", database_name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        assert_eq!(dedupe(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        let ids = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(dedupe(&ids), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn application_scope_filters_on_the_right_column() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT a.* FROM applications a");
        push_application_scope(&mut qb, Some(&ApplicationScope::Manager("mgr".into())));
        assert!(qb.sql().ends_with("WHERE p.manager_cognito_id = $1"));

        let mut qb = QueryBuilder::<Postgres>::new("SELECT a.* FROM applications a");
        push_application_scope(&mut qb, Some(&ApplicationScope::Tenant("ten".into())));
        assert!(qb.sql().ends_with("WHERE a.tenant_cognito_id = $1"));

        let mut qb = QueryBuilder::<Postgres>::new("SELECT a.* FROM applications a");
        push_application_scope(&mut qb, None);
        assert!(!qb.sql().contains("WHERE"));
    }

    fn antananarivo(latitude: f64, longitude: f64) -> ResolvedLocation {
        ResolvedLocation {
            coordinates: Coordinates {
                longitude,
                latitude,
            },
            address: Some("Lot II M 85".into()),
            city: Some("Antananarivo".into()),
            state: None,
            country: Some("Madagascar".into()),
            postal_code: Some("101".into()),
        }
    }

    #[test]
    fn unknown_coordinates_keep_the_stored_point() {
        let qb = location_update(antananarivo(0.0, 0.0), 7);
        assert!(!qb.sql().contains("coordinates"));
        assert!(qb.sql().ends_with("postal_code = $5 WHERE id = $6"));

        let qb = location_update(antananarivo(-18.91, 47.52), 7);
        assert!(qb
            .sql()
            .contains("coordinates = ST_SetSRID(ST_MakePoint($6, $7), 4326)::geography"));
        assert!(qb.sql().ends_with("WHERE id = $8"));
    }

    #[test]
    fn application_count_uses_the_same_joins_and_scope() {
        let scope = ApplicationScope::Manager("mgr".into());
        let rows = applications_query("SELECT a.*", Some(&scope));
        let count = applications_query("SELECT COUNT(*)", Some(&scope));

        let rows_sql = rows.sql().trim_start_matches("SELECT a.*");
        let count_sql = count.sql().trim_start_matches("SELECT COUNT(*)");
        assert_eq!(rows_sql, count_sql);
        assert!(count_sql.starts_with(APPLICATION_JOINS));
        assert!(count_sql.contains("JOIN tenants t"));
        assert!(count_sql.ends_with("WHERE p.manager_cognito_id = $1"));
    }

    #[test]
    fn approval_locks_the_application_row() {
        assert!(LOCK_APPLICATION.ends_with("FOR UPDATE"));
        assert!(LOCK_APPLICATION.contains("WHERE id = $1"));
    }

    #[test]
    fn page_clause_only_when_paginating() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        push_page(&mut qb, &Pagination::from_params(None, None));
        assert_eq!(qb.sql(), "SELECT 1");

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1");
        push_page(&mut qb, &Pagination::from_params(Some("3"), None));
        assert_eq!(qb.sql(), "SELECT 1 LIMIT $1 OFFSET $2");
    }
}
