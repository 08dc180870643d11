//! Tool layer: schemas the model may call, typed input, the registry that routes calls, and the
//! built-in file-system and shell executors.
//!
//! Tool failures are data: every executor turns its own errors into an error-flagged
//! [`ToolOutput`] so the model can see them and correct itself.

mod files;
mod input;
mod registry;
mod shell;

pub use files::FileTools;
pub use input::{validate_input, InputError, SchemaViolation, ToolInput};
pub use registry::ToolRegistry;
pub use shell::ShellTool;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tool definition as sent in the `tools` array of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// JSON-schema subset: an object with typed, described properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertyDefinition>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl ToolDefinition {
    /// Definition with an empty object schema; add properties with [`ToolDefinition::param`].
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema {
                kind: "object".to_string(),
                properties: BTreeMap::new(),
                required: Vec::new(),
            },
        }
    }

    pub fn param(
        mut self,
        name: &str,
        kind: &str,
        description: &str,
        required: bool,
    ) -> Self {
        self.input_schema.properties.insert(
            name.to_string(),
            PropertyDefinition {
                kind: kind.to_string(),
                description: description.to_string(),
            },
        );
        if required {
            self.input_schema.required.push(name.to_string());
        }
        self
    }
}

/// Outcome of one tool call, fed back to the model as a `tool_result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub output: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// A set of tools sharing one implementation. `execute` must not fail: errors are returned
/// as error-flagged output.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn execute(&self, name: &str, input: &ToolInput) -> ToolOutput;
}
