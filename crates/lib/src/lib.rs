//! Claudette core library: Messages API streaming, the response assembler and tool loop,
//! local tools, and conversation persistence used by the CLI.

pub mod agent;
pub mod assembler;
pub mod config;
pub mod conversation;
pub mod exec;
pub mod filesystem;
pub mod init;
pub mod kv;
pub mod llm;
pub mod secrets;
pub mod tools;
