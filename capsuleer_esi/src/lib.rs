pub mod actions;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod errors;
pub mod query;
pub mod token_store;

pub use auth::{AuthService, Clock, Credential, LoginRequest, SessionState, SystemClock};
pub use cache::{MemoryPriceCache, PriceCache};
pub use client::{EveSsoClient, InitialAuthTokens, RefreshTokens, SsoAuthClient};
pub use config::EsiConfig;
pub use errors::{ApiError, ApiErrorKind, AuthError, EsiError, EsiResult};
pub use query::{EsiQuery, QueryClient, QueryOutput, QueryRequest};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
