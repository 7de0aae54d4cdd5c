//! Bearer sessions: issuing, verification, revocation and the request gate.

pub mod claims;
pub mod extractors;
pub mod jwt;
pub mod middleware;
pub mod revocation;
