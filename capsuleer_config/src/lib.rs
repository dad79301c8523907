mod document;
mod error;
mod schema;
mod validate;

pub use document::{
    AlertConfig, AlertType, DashboardConfig, ReportConfig, ReportTemplate, load_config,
    load_config_with, resolve_env_refs,
};
pub use error::{ConfigError, ValidationError, Violation};
pub use schema::{ObjectSchema, Property, RequiredWhen, Schema, StringFormat, dashboard_schema};
pub use validate::{validate, validate_dashboard};
