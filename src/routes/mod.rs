mod account;
mod admin;
mod auth;
mod health_check;
mod oauth;
mod profile;

pub use account::{activate, forgot_password, resend_activation, reset_password};
pub use admin::{demote, promote};
pub use auth::{get_current_user, login, logout, refresh, register, AuthResponse};
pub use health_check::health_check;
pub use oauth::{google_callback, google_login};
pub use profile::{get_profile, update_profile};
