use serde_json::Value;

use super::transport::HttpMethod;

#[derive(Clone, Debug, PartialEq)]
pub struct QueryRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub token: Option<String>,
    pub body: Option<Value>,
    pub paginate: bool,
}

impl QueryRequest {
    pub fn new(method: HttpMethod, endpoint: impl AsRef<str>) -> Self {
        Self {
            method,
            endpoint: normalize_endpoint(endpoint.as_ref()),
            params: Vec::new(),
            token: None,
            body: None,
            paginate: false,
        }
    }

    pub fn get(endpoint: impl AsRef<str>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn paginated(mut self) -> Self {
        self.paginate = true;
        self
    }
}

/// What a query produced: one body, or the concatenated records of every page.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutput {
    Value(Value),
    Records(Vec<Value>),
}

impl QueryOutput {
    pub fn into_json(self) -> Value {
        match self {
            Self::Value(value) => value,
            Self::Records(records) => Value::Array(records),
        }
    }
}

pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}
