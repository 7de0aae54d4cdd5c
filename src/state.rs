use std::sync::Arc;

use crate::{auth::jwt::SessionAuthority, config::AppConfig, rpc::UserService};

/// Shared state of the HTTP gateway.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserService>,
    pub sessions: Arc<SessionAuthority>,
    pub public_paths: Arc<[String]>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        users: Arc<dyn UserService>,
        sessions: Arc<SessionAuthority>,
    ) -> Self {
        let public_paths = config.public_paths.clone().into();
        Self {
            config,
            users,
            sessions,
            public_paths,
        }
    }

    /// Gateway wired to in-memory fakes: user store, revocation list, cheap hashing.
    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::{
            auth::{jwt::test_keys, revocation::MemoryRevocationList},
            rpc::server::test_handler,
        };

        let config = AppConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("test".into()),
            "APP_ROLE" => Some("gateway".into()),
            _ => None,
        })
        .expect("test config");

        let sessions = SessionAuthority::new(
            test_keys("test", &config.jwt.issuer, &config.jwt.audience),
            Arc::new(MemoryRevocationList::new()),
        );
        Self::new(Arc::new(config), Arc::new(test_handler()), Arc::new(sessions))
    }
}
