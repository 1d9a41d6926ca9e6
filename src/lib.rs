pub mod aggregate;
pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod docs;
pub mod engine;
pub mod error;
pub mod geofence;
pub mod ledger;
pub mod model;
pub mod repo;
pub mod routes;
pub mod sweep;
pub mod utils;
