use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::Value;

use super::{
    request::{QueryOutput, QueryRequest},
    retry::{RetryDecision, RetryPolicy, Sleeper, TokioSleeper},
    transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport},
};
use crate::{
    EsiResult,
    config::EsiConfig,
    errors::{ApiError, ApiErrorKind, ApiResult},
};

const DEFAULT_PAGE_CONCURRENCY: usize = 4;
const ERROR_LIMIT_WARN_THRESHOLD: u32 = 10;

/// Read side of ESI as the higher-level actions see it.
#[async_trait]
pub trait EsiQuery: Send + Sync {
    async fn fetch_one(&self, request: &QueryRequest) -> ApiResult<Value>;
    async fn fetch_all(&self, request: &QueryRequest) -> ApiResult<Vec<Value>>;

    async fn query(&self, request: &QueryRequest) -> ApiResult<QueryOutput> {
        if request.paginate {
            Ok(QueryOutput::Records(self.fetch_all(request).await?))
        } else {
            Ok(QueryOutput::Value(self.fetch_one(request).await?))
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct QueryResponse {
    pub body: Value,
    pub expires: Option<String>,
}

pub struct QueryClient<H = ReqwestTransport, Z = TokioSleeper>
where
    H: HttpTransport,
    Z: Sleeper,
{
    transport: H,
    sleeper: Z,
    base_url: String,
    retry: RetryPolicy,
    page_concurrency: usize,
}

impl QueryClient<ReqwestTransport, TokioSleeper> {
    pub fn from_config(config: &EsiConfig) -> EsiResult<Self> {
        let transport = ReqwestTransport::from_config(config)?;
        Ok(Self::with_transport(transport, TokioSleeper, &config.base_url))
    }
}

impl<H, Z> QueryClient<H, Z>
where
    H: HttpTransport,
    Z: Sleeper,
{
    pub fn with_transport(transport: H, sleeper: Z, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            sleeper,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            retry: RetryPolicy::default(),
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_concurrency(mut self, page_concurrency: usize) -> Self {
        self.page_concurrency = page_concurrency.max(1);
        self
    }

    pub async fn fetch_response(&self, request: &QueryRequest) -> ApiResult<QueryResponse> {
        let response = self.execute(request, None).await?;
        Ok(QueryResponse {
            expires: response.header("expires").map(ToOwned::to_owned),
            body: parse_body(&response.body),
        })
    }

    async fn fetch_page(
        &self,
        request: &QueryRequest,
        page: u32,
        total_pages: u32,
    ) -> ApiResult<Vec<Value>> {
        let response = self.execute(request, Some(page)).await?;
        let records = into_records(parse_body(&response.body));
        log::debug!(
            "{} page {page}/{total_pages} fetched ({} items)",
            request.endpoint,
            records.len()
        );
        Ok(records)
    }

    async fn execute(&self, request: &QueryRequest, page: Option<u32>) -> ApiResult<HttpResponse> {
        let http_request = self.http_request(request, page);
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            let (error, hint) = match self.transport.send(&http_request).await {
                Ok(response) => {
                    log_error_limit(&request.endpoint, &response);
                    let error = |kind| {
                        ApiError::new(kind, &request.endpoint)
                            .with_status(response.status)
                            .with_body(response.body.clone())
                            .on_page(page)
                    };
                    match classify_status(response.status) {
                        StatusClass::Success => return Ok(response),
                        StatusClass::Fatal(kind) => return Err(error(kind)),
                        StatusClass::Retryable(kind) => (error(kind), retry_hint(&response)),
                    }
                }
                Err(err) => (
                    ApiError::new(ApiErrorKind::NetworkError, &request.endpoint)
                        .with_body(err.to_string())
                        .on_page(page),
                    None,
                ),
            };

            match self.retry.next_delay(attempts, hint) {
                RetryDecision::GiveUp => {
                    log::warn!("giving up on {} after {attempts} attempts: {error}", request.endpoint);
                    return Err(error);
                }
                RetryDecision::RetryAfter(delay) => {
                    log::debug!(
                        "attempt {attempts} for {} failed ({error}); retrying in {delay:?}",
                        request.endpoint
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    fn http_request(&self, request: &QueryRequest, page: Option<u32>) -> HttpRequest {
        let mut query = request.params.clone();
        if let Some(page) = page {
            query.push(("page".to_owned(), page.to_string()));
        }

        HttpRequest {
            method: request.method,
            url: format!("{}{}", self.base_url, request.endpoint),
            query,
            bearer: request.token.clone(),
            body: request.body.clone(),
        }
    }
}

#[async_trait]
impl<H, Z> EsiQuery for QueryClient<H, Z>
where
    H: HttpTransport,
    Z: Sleeper,
{
    async fn fetch_one(&self, request: &QueryRequest) -> ApiResult<Value> {
        let response = self.execute(request, None).await?;
        Ok(parse_body(&response.body))
    }

    async fn fetch_all(&self, request: &QueryRequest) -> ApiResult<Vec<Value>> {
        let first = self.execute(request, Some(1)).await?;
        let total_pages = first
            .header("x-pages")
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);

        let mut records = match parse_body(&first.body) {
            Value::Array(items) => items,
            Value::Null => return Ok(Vec::new()),
            other => return Ok(vec![other]),
        };
        log::debug!(
            "{} page 1/{total_pages} fetched ({} items)",
            request.endpoint,
            records.len()
        );

        if total_pages > 1 {
            // `buffered` yields in input order, so pages reassemble in sequence.
            let pages: Vec<Vec<Value>> = stream::iter(2..=total_pages)
                .map(|page| self.fetch_page(request, page, total_pages))
                .buffered(self.page_concurrency)
                .try_collect()
                .await?;
            records.extend(pages.into_iter().flatten());
        }

        Ok(records)
    }
}

enum StatusClass {
    Success,
    Retryable(ApiErrorKind),
    Fatal(ApiErrorKind),
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::Fatal(ApiErrorKind::Unauthorized),
        404 => StatusClass::Fatal(ApiErrorKind::NotFound),
        420 | 429 => StatusClass::Retryable(ApiErrorKind::RateLimited),
        500..=599 => StatusClass::Retryable(ApiErrorKind::ServerError),
        _ => StatusClass::Fatal(ApiErrorKind::BadRequest),
    }
}

fn retry_hint(response: &HttpResponse) -> Option<Duration> {
    let seconds = |name: &str| {
        response
            .header(name)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    };

    seconds("retry-after").or_else(|| {
        if response.status == 420 {
            seconds("x-esi-error-limit-reset")
        } else {
            None
        }
    })
}

fn log_error_limit(endpoint: &str, response: &HttpResponse) {
    let Some(remain) = response
        .header("x-esi-error-limit-remain")
        .and_then(|raw| raw.trim().parse::<u32>().ok())
    else {
        return;
    };

    if remain <= ERROR_LIMIT_WARN_THRESHOLD {
        log::warn!(
            "ESI error limit low after {endpoint}: {remain} remaining, resets in {}s",
            response.header("x-esi-error-limit-reset").unwrap_or("?")
        );
    }
}

fn parse_body(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

fn into_records(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
