mod callback;
mod pkce;
mod service;
mod types;

pub use callback::{CallbackListener, CallbackParams};
pub use pkce::{PkcePair, generate_pkce_pair, generate_state};
pub use service::{AuthService, Clock, SystemClock};
pub use types::{Credential, LoginRequest, SessionState};
