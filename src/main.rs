mod clients;
mod config;
mod database;
mod error;
mod featuring;
mod filters;
mod form;
mod handlers;
mod leasing;
mod models;
mod pagination;
mod photos;
mod pricing;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use crate::clients::geocoding::GeocodingClient;
use crate::clients::storage::ObjectStorage;
use crate::config::AppConfig;
use crate::database::Database;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env()?;
    let bind_address = config.bind_address();

    let db = Database::connect(&config.database_url).await.map_err(|err| {
        log::error!("Failed to initialize database: {err:?}");
        std::io::Error::new(std::io::ErrorKind::Other, err)
    })?;
    log::info!("Database ready, migrations applied");

    let storage = ObjectStorage::new(config.storage_settings());
    if !storage.is_configured() {
        log::warn!("S3_ENDPOINT / S3_BUCKET_NAME not set; photo uploads will fail");
    } else if config.s3_access_key_id.is_none() {
        log::warn!("AWS_ACCESS_KEY_ID not set; photo uploads are sent unsigned");
    }

    let db_data = web::Data::new(db);
    let geocoder = web::Data::new(GeocodingClient::new(
        config.geocoder_url.clone(),
        config.geocoder_user_agent.clone(),
    ));
    let storage = web::Data::new(storage);

    log::info!("🚀 Starting Madagou listing service on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(geocoder.clone())
            .app_data(storage.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
