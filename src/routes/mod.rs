pub mod error;
pub mod users;

pub async fn health() -> &'static str {
    "ok"
}
