use schemars::JsonSchema as DeriveSchema;
use serde::{Deserialize, Serialize};

use super::JsonSchema;

/// A function the remote model may call. Declared in `session.update`;
/// calls are surfaced to observers but never executed by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    #[serde(rename = "type", default)]
    pub kind: ToolKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for tool parameters (intentionally untyped).
    pub parameters: JsonSchema,
}

impl ToolSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: JsonSchema) -> Self {
        Self {
            kind: ToolKind::Function,
            name: name.into(),
            description: Some(description.into()),
            parameters,
        }
    }

    /// Derive the parameter schema from an argument type.
    ///
    /// # Errors
    /// Returns an error if the generated schema cannot be serialized.
    #[allow(clippy::result_large_err)]
    pub fn for_args<TArgs: DeriveSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> crate::Result<Self> {
        let schema = schemars::schema_for!(TArgs);
        let parameters = serde_json::to_value(&schema)?;
        Ok(Self::new(name, description, parameters))
    }

    /// # Errors
    /// Returns an error if the name is empty or the parameters are not a JSON object.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidConfig("tool name must not be empty".to_string()));
        }
        if !self.parameters.is_object() {
            return Err(crate::Error::InvalidConfig(format!(
                "tool `{}` parameters must be a JSON schema object",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Function,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}
