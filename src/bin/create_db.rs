use tokio_postgres::NoTls;

/// Creates the service database and enables PostGIS in it. The server does
/// the same on startup; this is for provisioning ahead of time.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let conn_str = std::env::var("PG_ADMIN_CONN")
        .unwrap_or_else(|_| "host=127.0.0.1 user=postgres dbname=postgres".into());
    let db_name = std::env::var("DB_NAME").unwrap_or_else(|_| "madagou".into());

    let valid_name = db_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name {
        eprintln!("Refusing to create database: invalid database name '{}'.", db_name);
        return Ok(());
    }

    println!("Connecting to Postgres to manage databases...");
    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    let row = client
        .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&db_name])
        .await?;

    if row.is_some() {
        println!("Database '{}' already exists.", db_name);
    } else {
        let create_sql = format!("CREATE DATABASE \"{}\"", db_name);
        client.execute(create_sql.as_str(), &[]).await?;
        println!("Database '{}' created successfully.", db_name);
    }

    // PostGIS has to be enabled inside the new database, not the admin one.
    let mut target_config: tokio_postgres::Config = conn_str.parse()?;
    target_config.dbname(&db_name);
    let (target, connection) = target_config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    match target.batch_execute("CREATE EXTENSION IF NOT EXISTS postgis").await {
        Ok(()) => println!("PostGIS enabled in '{}'.", db_name),
        Err(e) => eprintln!("Could not enable PostGIS in '{}': {}", db_name, e),
    }

    Ok(())
}
