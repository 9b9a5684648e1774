/// Middleware module
///
/// Bearer-token authentication and the role gate for protected routes.

mod jwt_middleware;

pub use jwt_middleware::{authenticate, authorize, AuthenticatedUser, JwtMiddleware};
