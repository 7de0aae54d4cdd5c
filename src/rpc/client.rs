use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use super::{
    Code, DeleteUserRequest, Empty, GetUserByEmailRequest, GetUserByEmailResponse, LoginRequest,
    LoginResponse, RegisterRequest, RegisterResponse, Status, UpdateUserRequest,
    UpdateUserResponse, UserService, SERVICE_PATH,
};

/// Calls a user service listening on another process.
#[derive(Clone)]
pub struct RemoteUserService {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteUserService {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn call<Req, Resp>(&self, method: &str, req: &Req) -> Result<Resp, Status>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{SERVICE_PATH}/{method}", self.base_url);
        debug!(%url, "rpc call");

        let res = self
            .http
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(transport_status)?;

        if res.status().is_success() {
            return res.json::<Resp>().await.map_err(|e| {
                error!(error = %e, method, "rpc response decode failed");
                Status::internal()
            });
        }

        let http_status = res.status();
        match res.json::<Status>().await {
            Ok(status) => Err(status),
            Err(e) => {
                error!(error = %e, %http_status, method, "rpc error body unreadable");
                Err(Status::new(Code::Unavailable, "user service unavailable"))
            }
        }
    }
}

fn transport_status(e: reqwest::Error) -> Status {
    if e.is_timeout() {
        Status::deadline_exceeded()
    } else {
        error!(error = %e, "user service unreachable");
        Status::new(Code::Unavailable, "user service unavailable")
    }
}

#[async_trait]
impl UserService for RemoteUserService {
    async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, Status> {
        self.call("Register", &req).await
    }

    async fn login(&self, req: LoginRequest) -> Result<LoginResponse, Status> {
        self.call("Login", &req).await
    }

    async fn get_user_by_email(
        &self,
        req: GetUserByEmailRequest,
    ) -> Result<GetUserByEmailResponse, Status> {
        self.call("GetUserByEmail", &req).await
    }

    async fn update_user(&self, req: UpdateUserRequest) -> Result<UpdateUserResponse, Status> {
        self.call("UpdateUser", &req).await
    }

    async fn delete_user(&self, req: DeleteUserRequest) -> Result<Empty, Status> {
        self.call("DeleteUser", &req).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rpc::server::{router, test_handler};

    async fn spawn_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = router(Arc::new(test_handler()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn remote_calls_round_trip_statuses() {
        let url = spawn_server().await;
        let client = RemoteUserService::new(&url, Duration::from_secs(5)).expect("client");

        let reg = client
            .register(RegisterRequest {
                email: "a@x.com".into(),
                password: "Passw0rd!".into(),
                confirm_password: "Passw0rd!".into(),
            })
            .await
            .expect("register");

        let err = client
            .register(RegisterRequest {
                email: "a@x.com".into(),
                password: "Passw0rd!".into(),
                confirm_password: "Passw0rd!".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::AlreadyExists);

        let login = client
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "Passw0rd!".into(),
            })
            .await
            .expect("login");
        assert_eq!(login.user_id, reg.user_id);

        let err = client
            .get_user_by_email(GetUserByEmailRequest {
                email: "nobody@x.com".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::NotFound);

        client
            .delete_user(DeleteUserRequest {
                actor_id: reg.user_id,
                user_id: reg.user_id,
            })
            .await
            .expect("delete");
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        // bind then drop so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client =
            RemoteUserService::new(&format!("http://{addr}"), Duration::from_secs(2)).expect("client");
        let err = client
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "Passw0rd!".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Unavailable);
    }

    #[tokio::test]
    async fn slow_service_hits_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = axum::Router::new().route(
            &format!("{SERVICE_PATH}/Login"),
            axum::routing::post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        let client = RemoteUserService::new(&format!("http://{addr}"), Duration::from_millis(100))
            .expect("client");
        let err = client
            .login(LoginRequest {
                email: "a@x.com".into(),
                password: "Passw0rd!".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::DeadlineExceeded);
    }
}
