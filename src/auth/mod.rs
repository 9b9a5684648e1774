/// Authentication module
///
/// Password and token hashing, the JWT codec, the identity and token stores'
/// interfaces, and the services built on them: authentication, activation and
/// password reset, and profiles.

pub mod account;
pub mod claims;
pub mod jwt;
pub mod one_time_token;
pub mod password;
pub mod profile;
pub mod refresh_token;
pub mod role;
pub mod service;
pub mod token_hash;
pub mod user;

pub use account::{AccountConfig, AccountService};
pub use claims::Claims;
pub use jwt::{generate_access_token, generate_refresh_token, validate_token};
pub use one_time_token::{Activation, OneTimeTokenService, PasswordReset, TokenKind};
pub use password::{hash_password, verify_password};
pub use profile::{ProfileService, UpdateProfileRequest, UserResponse};
pub use role::Role;
pub use service::{
    AuthConfig, AuthService, ExternalIdentity, FirstUserPolicy, RegisterRequest, TokenPair,
};
pub use token_hash::hash_token;
pub use user::{User, UserProfile};
