use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ConfigError, ValidationError, Violation},
    validate::{ENV_PREFIX, validate_dashboard},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    pub characters: Vec<String>,
    #[serde(default)]
    pub alerts: Vec<AlertConfig>,
    #[serde(default)]
    pub reports: Vec<ReportConfig>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertConfig {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub template: ReportTemplate,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    WarDeclared,
    StructureUnderAttack,
    SkillComplete,
    WalletLargeDeposit,
    IndustryJobComplete,
    PiExtractorExpired,
    Killmail,
    ContractExpired,
}

impl AlertType {
    pub const ALL: [Self; 8] = [
        Self::WarDeclared,
        Self::StructureUnderAttack,
        Self::SkillComplete,
        Self::WalletLargeDeposit,
        Self::IndustryJobComplete,
        Self::PiExtractorExpired,
        Self::Killmail,
        Self::ContractExpired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WarDeclared => "war_declared",
            Self::StructureUnderAttack => "structure_under_attack",
            Self::SkillComplete => "skill_complete",
            Self::WalletLargeDeposit => "wallet_large_deposit",
            Self::IndustryJobComplete => "industry_job_complete",
            Self::PiExtractorExpired => "pi_extractor_expired",
            Self::Killmail => "killmail",
            Self::ContractExpired => "contract_expired",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTemplate {
    NetWorth,
    SkillQueue,
    IndustryJobs,
    MarketOrders,
    WalletSummary,
    AssetsSummary,
}

impl ReportTemplate {
    pub const ALL: [Self; 6] = [
        Self::NetWorth,
        Self::SkillQueue,
        Self::IndustryJobs,
        Self::MarketOrders,
        Self::WalletSummary,
        Self::AssetsSummary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetWorth => "net_worth",
            Self::SkillQueue => "skill_queue",
            Self::IndustryJobs => "industry_jobs",
            Self::MarketOrders => "market_orders",
            Self::WalletSummary => "wallet_summary",
            Self::AssetsSummary => "assets_summary",
        }
    }
}

impl fmt::Display for ReportTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads, validates and resolves the dashboard config at `path` against the process environment.
pub fn load_config(path: impl AsRef<Path>) -> Result<DashboardConfig, ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

pub fn load_config_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<DashboardConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    validate_dashboard(&document)?;
    let resolved = resolve_env_refs(&document, lookup)?;
    let config: DashboardConfig = serde_json::from_value(resolved).map_err(ConfigError::Model)?;

    log::debug!(
        "loaded {} with {} character(s), {} alert(s), {} report(s)",
        path.display(),
        config.characters.len(),
        config.alerts.len(),
        config.reports.len()
    );
    Ok(config)
}

/// Returns a copy of `document` with every `$ENV:NAME` string replaced by the variable's value.
pub fn resolve_env_refs<F>(document: &Value, lookup: F) -> Result<Value, ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut violations = Vec::new();
    let resolved = resolve_value(document, "", &lookup, &mut violations);

    if violations.is_empty() {
        Ok(resolved)
    } else {
        Err(ValidationError { violations })
    }
}

fn resolve_value<F>(value: &Value, path: &str, lookup: &F, violations: &mut Vec<Violation>) -> Value
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(text) => {
            let Some(name) = text.strip_prefix(ENV_PREFIX) else {
                return value.clone();
            };
            if !is_env_name(name) {
                violations.push(Violation::new(
                    path,
                    format!("'{name}' is not a valid environment variable name"),
                ));
                return value.clone();
            }
            match lookup(name) {
                Some(resolved) => Value::String(resolved),
                None => {
                    violations.push(Violation::new(
                        path,
                        format!("environment variable {name} is not set"),
                    ));
                    value.clone()
                }
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| resolve_value(item, &format!("{path}/{index}"), lookup, violations))
                .collect(),
        ),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| {
                    (
                        key.clone(),
                        resolve_value(item, &format!("{path}/{key}"), lookup, violations),
                    )
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
