// API module for the catalog sync trigger
// Exposes the populate endpoint and a health probe over actix-web

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
