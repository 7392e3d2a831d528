pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthService, AuthenticatedUser, Credential, LoginRequest, RegisterRequest,
};
pub use auth_service_impl::SeaOrmAuthService;

pub mod directory_service;
pub mod directory_service_impl;
pub use directory_service::{
    CreateDirectoryUser, DirectoryError, DirectoryService, UpdateDirectoryUser,
};
pub use directory_service_impl::SeaOrmDirectoryService;

pub mod session;
pub use session::{SessionClaims, SessionTokenService};
