use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::io;
use std::sync::Arc;

use vistagram::api::{self, AppState};
use vistagram::auth::AuthService;
use vistagram::config::Config;
use vistagram::store::Store;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    // Initialize store
    let store = Arc::new(Store::new(&config.database_path).map_err(|e| {
        log::error!("Failed to initialize database at {}: {}", config.database_path, e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?);
    log::info!("Database: {}", config.database_path);

    // Initialize auth service
    let auth_service = Arc::new(
        AuthService::new(config.jwt_secret.clone(), store.clone())
            .with_token_ttl_days(config.token_ttl_days)
            .with_bcrypt_cost(config.bcrypt_cost),
    );

    let state = web::Data::new(AppState::new(store, auth_service));
    let cors_origin = config.cors_origin.clone();

    log::info!("Starting vistagram server on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default().allowed_origin(origin),
            None => Cors::default().allow_any_origin(),
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
