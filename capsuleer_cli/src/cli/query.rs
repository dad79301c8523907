use anyhow::Context;
use capsuleer_esi::{EsiQuery, QueryRequest, query::HttpMethod};
use clap::{Args, ValueEnum};

use crate::cli::common::{
    build_auth_service, build_query_client, load_esi_config, print_json, selected_character,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Method> for HttpMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::Get,
            Method::Post => Self::Post,
            Method::Put => Self::Put,
            Method::Delete => Self::Delete,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct QueryCommand {
    /// ESI path, e.g. `/characters/12345/wallet/`.
    #[arg(long)]
    endpoint: String,

    #[arg(long, value_enum, default_value_t = Method::Get)]
    method: Method,

    /// JSON request body for POST and PUT.
    #[arg(long)]
    body: Option<String>,

    /// Follow `X-Pages` and return every page (GET only).
    #[arg(long)]
    pages: bool,

    /// Query parameter as `key=value`; repeatable.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Authenticate as this stored character.
    #[arg(long)]
    character: Option<String>,
}

impl QueryCommand {
    pub(crate) async fn run(&self, pretty: bool) -> anyhow::Result<()> {
        let config = load_esi_config();
        let token = match selected_character(self.character.as_deref()) {
            Some(name) => Some(build_auth_service(&config)?.get_valid_token(&name).await?),
            None => None,
        };

        let mut request = QueryRequest::new(self.method.into(), &self.endpoint)
            .with_optional_token(token);
        for (key, value) in &self.params {
            request = request.param(key.as_str(), value);
        }
        if let Some(body) = &self.body {
            let body = serde_json::from_str(body).context("--body is not valid JSON")?;
            request = request.with_body(body);
        }

        let client = build_query_client(&config)?;
        if self.pages && matches!(self.method, Method::Get) {
            let records = client.fetch_all(&request.paginated()).await?;
            return print_json(&records, pretty);
        }

        let response = client.fetch_response(&request).await?;
        eprintln!(
            "Cache expires: {}",
            response.expires.as_deref().unwrap_or("unknown")
        );
        print_json(&response.body, pretty)
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((key.trim().to_owned(), value.to_owned()))
}
