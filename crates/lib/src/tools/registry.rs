//! Routes tool calls by name to the executor that declared the tool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::filesystem::FileSystem;
use crate::tools::{
    validate_input, FileTools, ShellTool, ToolDefinition, ToolExecutor, ToolInput, ToolOutput,
};

/// Fixed set of tools, assembled at startup and shared read-only afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    executors: Vec<Arc<dyn ToolExecutor>>,
    /// tool name -> (executor index, definition)
    routes: HashMap<String, (usize, ToolDefinition)>,
    /// Tool names in registration order.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// File tools over `fs` plus the shell tool running in `workspace`.
    pub fn with_default_tools(fs: Arc<dyn FileSystem>, workspace: Option<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FileTools::new(fs)));
        registry.register(Arc::new(ShellTool::new(workspace)));
        registry
    }

    /// Add every tool `executor` declares. A name that is already registered keeps its
    /// first owner.
    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) {
        let idx = self.executors.len();
        for def in executor.definitions() {
            if self.routes.contains_key(&def.name) {
                log::warn!("tools: duplicate tool {} ignored", def.name);
                continue;
            }
            self.order.push(def.name.clone());
            self.routes.insert(def.name.clone(), (idx, def));
        }
        self.executors.push(executor);
    }

    /// Schemas of every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.routes.get(name).map(|(_, def)| def.clone()))
            .collect()
    }

    pub fn tool_names(&self) -> &[String] {
        &self.order
    }

    /// Validate `input` against the tool's schema and run it. Never fails: unknown tools and
    /// invalid input come back as error-flagged output.
    pub async fn execute(&self, name: &str, input: &ToolInput) -> ToolOutput {
        let Some((idx, def)) = self.routes.get(name) else {
            return ToolOutput::error(format!(
                "Unknown tool: {}. Available tools: {}",
                name,
                self.tool_names().join(", ")
            ));
        };
        if let Err(violations) = validate_input(&def.input_schema, input) {
            let details: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
            return ToolOutput::error(format!(
                "Invalid input for {}: {}",
                name,
                details.join("; ")
            ));
        }
        log::info!("tools: executing {}", name);
        let output = self.executors[*idx].execute(name, input).await;
        if output.is_error {
            log::warn!("tools: {} reported an error", name);
        }
        output
    }

    /// Parse the raw accumulated input fragment, then [`ToolRegistry::execute`].
    pub async fn execute_raw(&self, name: &str, fragment: &str) -> ToolOutput {
        match ToolInput::parse(fragment) {
            Ok(input) => self.execute(name, &input).await,
            Err(e) => ToolOutput::error(format!("Invalid input for {}: {}", name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![
                ToolDefinition::new("echo", "Echo text").param("text", "string", "Text", true),
                ToolDefinition::new("noop", "Do nothing"),
            ]
        }

        async fn execute(&self, name: &str, input: &ToolInput) -> ToolOutput {
            match name {
                "echo" => ToolOutput::ok(input.str("text").unwrap_or_default()),
                _ => ToolOutput::ok(""),
            }
        }
    }

    struct Shadow;

    #[async_trait]
    impl ToolExecutor for Shadow {
        fn definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::new("echo", "Shadowed echo")]
        }

        async fn execute(&self, _name: &str, _input: &ToolInput) -> ToolOutput {
            ToolOutput::ok("shadow")
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Arc::new(Echo));
        r
    }

    #[tokio::test]
    async fn unknown_tool_lists_known_names() {
        let out = registry().execute("rm_rf", &ToolInput::default()).await;
        assert!(out.is_error);
        assert_eq!(out.output, "Unknown tool: rm_rf. Available tools: echo, noop");
    }

    #[tokio::test]
    async fn routes_to_owner() {
        let out = registry().execute_raw("echo", r#"{"text":"hi"}"#).await;
        assert_eq!(out, ToolOutput::ok("hi"));
    }

    #[tokio::test]
    async fn schema_violations_are_error_output() {
        let out = registry().execute_raw("echo", r#"{"text":1,"loud":true}"#).await;
        assert!(out.is_error);
        assert_eq!(
            out.output,
            "Invalid input for echo: parameter 'text' must be string, got integer; unknown parameter 'loud'"
        );
    }

    #[tokio::test]
    async fn unparseable_fragment_is_error_output() {
        let out = registry().execute_raw("echo", r#"{"text":"#).await;
        assert!(out.is_error);
        assert!(out.output.starts_with("Invalid input for echo: tool input is not valid JSON"));
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let mut r = registry();
        r.register(Arc::new(Shadow));
        assert_eq!(r.tool_names(), ["echo".to_string(), "noop".to_string()]);
        assert_eq!(r.definitions()[0].description, "Echo text");
        let out = r.execute_raw("echo", r#"{"text":"x"}"#).await;
        assert_eq!(out.output, "x");
    }

    #[test]
    fn default_tools_cover_files_and_shell() {
        let fs = Arc::new(crate::filesystem::LocalFileSystem::new(std::env::temp_dir()));
        let r = ToolRegistry::with_default_tools(fs, None);
        for name in [
            "read_file",
            "write_file",
            "list_files",
            "create_file",
            "delete_file",
            "file_exists",
            "execute_command",
        ] {
            assert!(r.tool_names().iter().any(|n| n == name), "missing {}", name);
        }
    }
}
