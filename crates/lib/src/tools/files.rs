//! File tools: read, write, list, create, delete and existence checks through a [`FileSystem`].

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::filesystem::FileSystem;
use crate::tools::{ToolDefinition, ToolExecutor, ToolInput, ToolOutput};

pub struct FileTools {
    fs: Arc<dyn FileSystem>,
}

impl FileTools {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    async fn read_file(&self, path: &str) -> ToolOutput {
        match self.fs.read_file(path).await {
            Ok(content) => ToolOutput::ok(content),
            Err(e) => ToolOutput::error(format!("Failed to read file: {}", e)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> ToolOutput {
        match self.fs.write_file(path, content).await {
            Ok(()) => ToolOutput::ok(format!("File written successfully to: {}", path)),
            Err(e) => ToolOutput::error(format!("Failed to write file: {}", e)),
        }
    }

    async fn list_files(&self, path: &str) -> ToolOutput {
        let entries = match self.fs.list_files(path).await {
            Ok(entries) => entries,
            Err(e) => return ToolOutput::error(format!("Failed to list files: {}", e)),
        };
        let mut out = format!("Files in {}:\n", path);
        for entry in &entries {
            if entry.is_dir {
                let _ = writeln!(out, "[DIR] {}", entry.name);
            } else {
                let _ = writeln!(out, "[FILE] {} ({} bytes)", entry.name, entry.size);
            }
        }
        if entries.is_empty() {
            out.push_str("(empty directory)\n");
        }
        ToolOutput::ok(out)
    }

    async fn create_file(&self, path: &str) -> ToolOutput {
        match self.fs.create_file(path).await {
            Ok(()) => ToolOutput::ok(format!("File created successfully: {}", path)),
            Err(e) => ToolOutput::error(format!("Failed to create file: {}", e)),
        }
    }

    async fn delete_file(&self, path: &str) -> ToolOutput {
        match self.fs.delete_file(path).await {
            Ok(()) => ToolOutput::ok(format!("File deleted successfully: {}", path)),
            Err(e) => ToolOutput::error(format!("Failed to delete file: {}", e)),
        }
    }
}

#[async_trait]
impl ToolExecutor for FileTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("read_file", "Read the contents of a file at the specified path")
                .param("path", "string", "The absolute or relative path to the file to read", true),
            ToolDefinition::new(
                "write_file",
                "Write content to a file at the specified path. Creates the file if it doesn't exist.",
            )
            .param("path", "string", "The absolute or relative path to the file to write", true)
            .param("content", "string", "The content to write to the file", true),
            ToolDefinition::new("list_files", "List all files and directories in the specified directory")
                .param("path", "string", "The absolute or relative path to the directory to list", true),
            ToolDefinition::new("create_file", "Create a new empty file at the specified path")
                .param("path", "string", "The absolute or relative path for the new file", true),
            ToolDefinition::new("delete_file", "Delete a file at the specified path")
                .param("path", "string", "The absolute or relative path to the file to delete", true),
            ToolDefinition::new("file_exists", "Check if a file or directory exists at the specified path")
                .param("path", "string", "The absolute or relative path to check", true),
        ]
    }

    async fn execute(&self, name: &str, input: &ToolInput) -> ToolOutput {
        let Some(path) = input.str("path") else {
            return ToolOutput::error("Missing 'path' parameter");
        };
        match name {
            "read_file" => self.read_file(path).await,
            "write_file" => match input.str("content") {
                Some(content) => self.write_file(path, content).await,
                None => ToolOutput::error("Missing 'content' parameter"),
            },
            "list_files" => self.list_files(path).await,
            "create_file" => self.create_file(path).await,
            "delete_file" => self.delete_file(path).await,
            "file_exists" => ToolOutput::ok(format!("File exists: {}", self.fs.exists(path).await)),
            _ => ToolOutput::error(format!("Unknown tool: {}", name)),
        }
    }
}
