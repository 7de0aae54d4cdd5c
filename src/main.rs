use std::{sync::Arc, time::Duration};

use anyhow::Context;

mod app;
mod auth;
mod config;
mod db;
mod routes;
mod rpc;
mod state;
mod users;

use crate::{
    auth::{
        jwt::{JwtKeys, SessionAuthority},
        revocation::{spawn_purger, MemoryRevocationList, PgRevocationList, RevocationList},
    },
    config::{AppConfig, RevocationBackend, Role},
    rpc::{client::RemoteUserService, server::UserHandler, UserService},
    state::AppState,
    users::{
        memory::MemoryCredentialStore, password::PasswordHasher, CredentialStore,
        IdentityService, PgCredentialStore,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userhub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env().context("load config")?);
    tracing::info!(role = ?config.role, "starting");

    let db = match config.database_url {
        Some(_) => Some(db::connect(&config).await?),
        None => None,
    };

    match config.role {
        Role::Rpc => {
            let svc = local_user_service(&config, db.as_ref())?;
            app::serve(app::build_rpc_app(svc), &config.rpc_host, config.rpc_port, "rpc").await
        }
        Role::All => {
            let svc = local_user_service(&config, db.as_ref())?;
            let state = gateway_state(config.clone(), svc.clone(), db.as_ref())?;
            tokio::try_join!(
                app::serve(app::build_rpc_app(svc), &config.rpc_host, config.rpc_port, "rpc"),
                app::serve(app::build_app(state), &config.http_host, config.http_port, "gateway"),
            )?;
            Ok(())
        }
        Role::Gateway => {
            let remote = RemoteUserService::new(&config.user_rpc_url, config.rpc_timeout())
                .context("build user service client")?;
            tracing::info!(url = %config.user_rpc_url, "using remote user service");
            let state = gateway_state(config.clone(), Arc::new(remote), db.as_ref())?;
            app::serve(app::build_app(state), &config.http_host, config.http_port, "gateway").await
        }
    }
}

fn local_user_service(
    config: &AppConfig,
    db: Option<&sqlx::PgPool>,
) -> anyhow::Result<Arc<dyn UserService>> {
    let store: Arc<dyn CredentialStore> = match db {
        Some(db) => Arc::new(PgCredentialStore::new(db.clone())),
        None => {
            tracing::warn!("DATABASE_URL not set; users are kept in memory and lost on exit");
            Arc::new(MemoryCredentialStore::new())
        }
    };
    let hasher = PasswordHasher::new(&config.password).context("password hasher")?;
    Ok(Arc::new(UserHandler::new(IdentityService::new(store, hasher))))
}

fn gateway_state(
    config: Arc<AppConfig>,
    users: Arc<dyn UserService>,
    db: Option<&sqlx::PgPool>,
) -> anyhow::Result<AppState> {
    let revocations: Arc<dyn RevocationList> = match config.revocation_backend {
        RevocationBackend::Memory => Arc::new(MemoryRevocationList::new()),
        RevocationBackend::Postgres => {
            let db = db.context("postgres revocation needs DATABASE_URL")?;
            Arc::new(PgRevocationList::new(db.clone()))
        }
    };
    spawn_purger(
        revocations.clone(),
        Duration::from_secs(config.revocation_purge_secs.max(1)),
    );

    let sessions = SessionAuthority::new(JwtKeys::from(&config.jwt), revocations);
    Ok(AppState::new(config, users, Arc::new(sessions)))
}
