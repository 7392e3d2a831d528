pub mod identity;
pub mod jwks;
