use crate::{api::attendance, auth::middleware::auth_middleware, config::Config};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    // Marking is throttled harder than the read paths.
    let mark_limiter = Arc::new(build_limiter(config.rate_mark_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/v1/attendance")
                    .service(
                        web::resource("/mark")
                            .wrap(mark_limiter)
                            .route(web::post().to(attendance::mark_attendance)),
                    )
                    .service(
                        web::resource("/logs").route(web::get().to(attendance::attendance_logs)),
                    )
                    .service(
                        web::resource("/daily-report")
                            .route(web::get().to(attendance::daily_report)),
                    )
                    .service(
                        web::resource("/monthly-summary")
                            .route(web::get().to(attendance::monthly_summary)),
                    )
                    .service(
                        web::resource("/report").route(web::get().to(attendance::range_report)),
                    ),
            ),
    );
}
