use crate::{
    api::{
        audit, compliance, dashboard, employee, export, fiscal, leave_request, notification,
        registry, sync, user,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-route rate limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct Limiters {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    protected: Limiter,
    upload: Limiter,
}

fn build_limiter(name: &str, requests_per_min: u32) -> anyhow::Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit for {name}: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl Limiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            login: build_limiter("login", config.rate_login_per_min)?,
            register: build_limiter("register", config.rate_register_per_min)?,
            refresh: build_limiter("refresh", config.rate_refresh_per_min)?,
            protected: build_limiter("protected", config.rate_protected_per_min)?,
            upload: build_limiter("upload", config.rate_upload_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiters.protected.clone())
            .service(handlers::me)
            .service(
                web::scope("/employees")
                    // /employees
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    // must precede /{employee_num}
                    .service(web::resource("/filters").route(web::get().to(employee::employee_filters)))
                    .service(
                        web::resource("/{employee_num}").route(web::get().to(employee::employee_history)),
                    )
                    .service(
                        web::resource("/{employee_num}/{year}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    )
                    .service(
                        web::resource("/{employee_num}/{year}/usage")
                            .route(web::get().to(employee::usage_details)),
                    )
                    .service(
                        web::resource("/{employee_num}/{year}/reconcile")
                            .route(web::post().to(employee::reconcile_employee)),
                    ),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // /leave/{id}
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    )
                    .service(
                        web::resource("/{id}/cancel")
                            .route(web::put().to(leave_request::cancel_leave)),
                    )
                    .service(
                        web::resource("/{id}/revert")
                            .route(web::put().to(leave_request::revert_leave)),
                    ),
            )
            .service(
                web::scope("/compliance")
                    .service(web::resource("/{year}").route(web::get().to(compliance::year_compliance)))
                    .service(
                        web::resource("/{employee_num}/{year}")
                            .route(web::get().to(compliance::employee_compliance)),
                    ),
            )
            .service(
                web::scope("/fiscal")
                    .service(web::resource("/grant-preview").route(web::get().to(fiscal::grant_preview)))
                    .service(web::resource("/year-end/{year}").route(web::post().to(fiscal::run_year_end)))
                    .service(web::resource("/expiring").route(web::get().to(fiscal::expiring))),
            )
            .service(web::resource("/dashboard/{year}").route(web::get().to(dashboard::year_dashboard)))
            .service(
                web::scope("/sync")
                    .app_data(web::PayloadConfig::new(config.max_upload_bytes))
                    .wrap(limiters.upload.clone())
                    .service(web::resource("/ledger").route(web::post().to(sync::sync_ledger)))
                    .service(web::resource("/registry").route(web::post().to(sync::sync_registry))),
            )
            .service(web::resource("/export/{year}").route(web::get().to(export::export_year)))
            .service(web::resource("/registry/{category}").route(web::get().to(registry::list_registry)))
            .service(
                web::scope("/notifications")
                    .service(web::resource("").route(web::get().to(notification::list_notifications)))
                    .service(web::resource("/read-all").route(web::put().to(notification::mark_all_read)))
                    .service(web::resource("/{id}/read").route(web::put().to(notification::mark_read))),
            )
            .service(web::resource("/audit").route(web::get().to(audit::list_audit)))
            .service(web::resource("/users/{user_id}/role").route(web::put().to(user::set_role))),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, the old refresh token is revoked

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rate_still_builds_a_limiter() {
        let config = Config {
            rate_upload_per_min: 0,
            ..Config::for_tests()
        };
        assert!(Limiters::from_config(&config).is_ok());
    }
}
