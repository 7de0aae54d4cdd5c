pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub use repo::{CredentialStore, PgCredentialStore};
pub use repo_types::{Profile, ProfileUpdate, UserId};
pub use services::{IdentityError, IdentityService};
