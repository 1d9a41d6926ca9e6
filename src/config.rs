use crate::geofence::{GeoPoint, GeofencePolicy};
use chrono::FixedOffset;
use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Geofence
    pub office_latitude: f64,
    pub office_longitude: f64,
    pub geofence_radius_meters: f64,
    pub geofence_enabled: bool,

    /// Fixed offset of the office timezone, in minutes east of UTC.
    /// Attendance days roll over at this timezone's midnight.
    pub utc_offset_minutes: i32,

    // Rate limiting
    pub rate_mark_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub report_cache_warmup_days: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),

            office_latitude: env::var("OFFICE_LATITUDE")
                .unwrap_or_else(|_| "25.6100".to_string())
                .parse()
                .unwrap(),
            office_longitude: env::var("OFFICE_LONGITUDE")
                .unwrap_or_else(|_| "85.1414".to_string())
                .parse()
                .unwrap(),
            geofence_radius_meters: env::var("GEOFENCE_RADIUS_METERS")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .unwrap(),
            geofence_enabled: env::var("GEOFENCE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap(),

            utc_offset_minutes: env::var("UTC_OFFSET_MINUTES")
                .unwrap_or_else(|_| "330".to_string()) // default IST
                .parse()
                .unwrap(),

            rate_mark_per_min: env::var("RATE_MARK_PER_MIN")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap(),
            rate_protected_per_min: env::var("RATE_PROTECTED_PER_MIN")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap(),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            report_cache_warmup_days: env::var("REPORT_CACHE_WARMUP_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .unwrap(),
        }
    }

    pub fn geofence_policy(&self) -> GeofencePolicy {
        let office = GeoPoint::new(self.office_longitude, self.office_latitude)
            .expect("OFFICE_LATITUDE/OFFICE_LONGITUDE out of range");
        GeofencePolicy::new(office, self.geofence_radius_meters, self.geofence_enabled)
    }

    pub fn reference_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .expect("UTC_OFFSET_MINUTES out of range")
    }
}
