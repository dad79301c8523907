use std::{fmt, path::PathBuf};

/// One structural problem, located by a JSON-pointer-like path (`/alerts/0/threshold`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {} is not valid JSON", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config is invalid: {0}")]
    Invalid(#[from] ValidationError),

    #[error("config could not be mapped onto the dashboard model: {0}")]
    Model(#[source] serde_json::Error),
}

impl ConfigError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid(err) => &err.violations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ValidationError, Violation};

    #[test]
    fn lists_every_violation() {
        let err = ValidationError {
            violations: vec![
                Violation::new("", "missing required field 'characters'"),
                Violation::new("/webhook_url", "expected string, found number"),
            ],
        };

        assert_eq!(
            err.to_string(),
            "2 violation(s); /: missing required field 'characters'; /webhook_url: expected string, found number"
        );
    }
}
