use crate::document::{AlertType, ReportTemplate};

/// Structural description of a JSON document.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    String {
        allowed: Option<Vec<&'static str>>,
        format: StringFormat,
    },
    Number {
        minimum: Option<f64>,
    },
    Boolean,
    Array {
        items: Box<Schema>,
        min_items: usize,
    },
    Object(ObjectSchema),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringFormat {
    Any,
    NonEmpty,
    /// `http(s)://...`, or an `$ENV:NAME` reference resolved at load time.
    UrlOrEnv,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub schema: Schema,
    pub required: bool,
}

/// Extra required fields when a discriminator field holds a given value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequiredWhen {
    pub field: &'static str,
    pub equals: &'static str,
    pub require: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSchema {
    pub properties: Vec<Property>,
    pub required_when: Vec<RequiredWhen>,
    pub allow_unknown: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            required_when: Vec::new(),
            allow_unknown: false,
        }
    }

    pub fn required(mut self, name: &'static str, schema: Schema) -> Self {
        self.properties.push(Property {
            name,
            schema,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, schema: Schema) -> Self {
        self.properties.push(Property {
            name,
            schema,
            required: false,
        });
        self
    }

    pub fn require_when(
        mut self,
        field: &'static str,
        equals: &'static str,
        require: Vec<&'static str>,
    ) -> Self {
        self.required_when.push(RequiredWhen {
            field,
            equals,
            require,
        });
        self
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }
}

impl Default for ObjectSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn string() -> Self {
        Self::String {
            allowed: None,
            format: StringFormat::Any,
        }
    }

    pub fn non_empty_string() -> Self {
        Self::String {
            allowed: None,
            format: StringFormat::NonEmpty,
        }
    }

    pub fn one_of(allowed: Vec<&'static str>) -> Self {
        Self::String {
            allowed: Some(allowed),
            format: StringFormat::NonEmpty,
        }
    }

    pub fn array_of(items: Schema) -> Self {
        Self::Array {
            items: Box::new(items),
            min_items: 0,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Array { .. } => "array",
            Self::Object(_) => "object",
        }
    }
}

/// The dashboard configuration document accepted by `load_config`.
pub fn dashboard_schema() -> Schema {
    let alert = ObjectSchema::new()
        .required(
            "type",
            Schema::one_of(AlertType::ALL.iter().map(|kind| kind.as_str()).collect()),
        )
        .optional("character", Schema::non_empty_string())
        .optional(
            "threshold",
            Schema::Number {
                minimum: Some(0.0),
            },
        )
        .optional("enabled", Schema::Boolean)
        .require_when(
            "type",
            AlertType::WalletLargeDeposit.as_str(),
            vec!["threshold"],
        );

    let report = ObjectSchema::new()
        .required(
            "template",
            Schema::one_of(
                ReportTemplate::ALL
                    .iter()
                    .map(|template| template.as_str())
                    .collect(),
            ),
        )
        .optional("character", Schema::non_empty_string())
        .optional("schedule", Schema::non_empty_string());

    Schema::Object(
        ObjectSchema::new()
            .required(
                "characters",
                Schema::Array {
                    items: Box::new(Schema::non_empty_string()),
                    min_items: 1,
                },
            )
            .optional("alerts", Schema::array_of(Schema::Object(alert)))
            .optional("reports", Schema::array_of(Schema::Object(report)))
            .optional(
                "webhook_url",
                Schema::String {
                    allowed: None,
                    format: StringFormat::UrlOrEnv,
                },
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::{Schema, dashboard_schema};

    #[test]
    fn dashboard_alerts_know_every_alert_type() {
        let Schema::Object(root) = dashboard_schema() else {
            panic!("dashboard schema must be an object");
        };
        let alerts = root.property("alerts").expect("alerts property");
        let Schema::Array { items, .. } = &alerts.schema else {
            panic!("alerts must be an array");
        };
        let Schema::Object(alert) = items.as_ref() else {
            panic!("alert must be an object");
        };
        let Schema::String {
            allowed: Some(allowed),
            ..
        } = &alert.property("type").expect("type").schema
        else {
            panic!("alert type must be an enumeration");
        };

        assert_eq!(allowed.len(), 8);
        assert!(allowed.contains(&"wallet_large_deposit"));
        assert_eq!(alert.required_when[0].require, vec!["threshold"]);
    }
}
