mod client;
mod request;
mod retry;
mod transport;

pub use client::{EsiQuery, QueryClient, QueryResponse};
pub use request::{QueryOutput, QueryRequest, normalize_endpoint};
pub use retry::{RetryDecision, RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};
