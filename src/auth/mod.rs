/// Session continuity
///
/// Refresh-token records and their stores, the subject directory,
/// access-token signing, and the refresh protocol tying them together.

mod claims;
mod directory;
mod issuer;
mod jwt;
mod refresh_token;
mod service;
mod store;

pub use claims::Claims;
pub use directory::{InMemorySubjectDirectory, PgSubjectDirectory, SubjectDirectory};
pub use issuer::TokenIssuer;
pub use jwt::{AccessTokenSigner, JwtSigner};
pub use refresh_token::{generate_refresh_token, hash_token, RefreshToken, Subject};
pub use service::{format_local_timestamp, RefreshTokenService, TokenRefreshResponse, TOKEN_TYPE_PREFIX};
pub use store::{InMemoryRefreshTokenStore, PgRefreshTokenStore, RefreshTokenStore};
