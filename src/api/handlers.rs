// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::api::server::AppState;
use crate::database_ops::catalog::CatalogQuery;
use actix_web::{web, HttpResponse, Result};
use std::collections::HashMap;

/// Health check endpoint
pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        store: state.store_backend.to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Run one catalog sync with the request's query parameters.
///
/// `limit` and `order` override the defaults; every other parameter is forwarded
/// to the catalog unchanged.
pub async fn populate(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let query = CatalogQuery::from_map(query.into_inner());
    tracing::info!(
        limit = query.limit,
        order = %query.order,
        extra = ?query.extra,
        "Populate requested"
    );

    match state.sync.run(&query).await {
        Ok(summary) => {
            Ok(HttpResponse::Ok().json(ApiResponse::success(PopulateResponse::finished(summary))))
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "Populate aborted");
            Ok(HttpResponse::BadGateway()
                .json(ApiResponse::<PopulateResponse>::error(format!("{err:#}"))))
        }
    }
}
