// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1").service(
                web::resource("/games/populate")
                    .route(web::post().to(handlers::populate))
                    .route(web::get().to(handlers::populate)),
            ),
        );
}
