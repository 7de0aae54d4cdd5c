use serde::{Deserialize, Serialize};

use crate::users::UserId;

/// JWT payload binding a user to one login session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub sub: UserId, // user ID
    pub sid: String, // session ID, fresh per login
    pub iat: i64,    // issued at (unix seconds)
    pub exp: i64,    // expires at (unix seconds)
    pub iss: String, // issuer
    pub aud: String, // audience
}
