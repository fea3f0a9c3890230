use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{PgRefreshTokenStore, PgSubjectDirectory, RefreshTokenService};
use crate::clock::SystemClock;
use crate::configuration::JwtSettings;
use crate::logger::RequestLogger;
use crate::routes::{health_check, refresh_token};

/// Wire the refresh protocol to Postgres-backed collaborators
pub fn build_service(pool: PgPool, jwt_config: &JwtSettings) -> RefreshTokenService {
    RefreshTokenService::from_settings(
        jwt_config,
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        Arc::new(PgSubjectDirectory::new(pool)),
        Arc::new(SystemClock),
    )
}

pub fn run(listener: TcpListener, service: RefreshTokenService) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(RequestLogger)
            .app_data(service.clone())
            .route("/health_check", web::get().to(health_check))
            .route("/auth/refresh-token", web::post().to(refresh_token))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
