use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use claudette::agent::ChatAgent;
use claudette::config::{self, Config};
use claudette::conversation::ConversationStore;
use claudette::filesystem::LocalFileSystem;
use claudette::kv::FileKvStore;
use claudette::llm::AnthropicClient;
use claudette::secrets::{looks_like_api_key, EnvKeyStore, FileKeyStore, KeyStore};
use claudette::tools::ToolRegistry;

mod render;

/// Snapshots buffered between the send task and the terminal.
const SNAPSHOT_BUFFER: usize = 64;
const TITLE_CHARS: usize = 50;

#[derive(Parser)]
#[command(name = "claudette")]
#[command(about = "Chat with Claude from the terminal, with local file and shell tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, workspace, data directory).
    Init {
        /// Config file path (default: CLAUDETTE_CONFIG_PATH or ~/.claudette/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat interactively. The model may read and write files in the workspace and run commands.
    Chat {
        /// Config file path (default: CLAUDETTE_CONFIG_PATH or ~/.claudette/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Existing conversation id to continue.
        #[arg(long, value_name = "ID")]
        conversation: Option<String>,

        /// Model id (overrides agent.model).
        #[arg(long, short, value_name = "MODEL")]
        model: Option<String>,
    },

    /// List stored conversations, most recent first.
    Conversations {
        /// Config file path (default: CLAUDETTE_CONFIG_PATH or ~/.claudette/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Delete a conversation and its messages.
    Delete {
        /// Conversation id
        id: String,

        /// Config file path (default: CLAUDETTE_CONFIG_PATH or ~/.claudette/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List models available to the configured API key.
    Models {
        /// Config file path (default: CLAUDETTE_CONFIG_PATH or ~/.claudette/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Read an API key from stdin, check it against the API and store it.
    SetKey {
        /// Config file path (default: CLAUDETTE_CONFIG_PATH or ~/.claudette/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("claudette {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Chat {
            config,
            conversation,
            model,
        }) => run_chat(config, conversation, model).await,
        Some(Commands::Conversations { config }) => run_conversations(config).await,
        Some(Commands::Delete { id, config }) => run_delete(config, id).await,
        Some(Commands::Models { config }) => run_models(config).await,
        Some(Commands::SetKey { config }) => run_set_key(config).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(config::default_config_path);
    let dir = claudette::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn key_store(config_path: &std::path::Path) -> Arc<dyn KeyStore> {
    Arc::new(EnvKeyStore::new(FileKeyStore::in_config_dir(
        &config::config_dir(config_path),
    )))
}

fn client(config: &Config, keys: Arc<dyn KeyStore>) -> AnthropicClient {
    AnthropicClient::new(Some(config.api.base_url.clone()), keys)
        .with_api_version(config.api.version.clone())
}

async fn open_store(config: &Config, config_path: &std::path::Path) -> ConversationStore {
    let dir = config::resolve_storage_dir(config, config_path);
    log::debug!("conversations stored in {}", dir.display());
    ConversationStore::open(Arc::new(FileKvStore::new(dir))).await
}

async fn run_chat(
    config_path: Option<PathBuf>,
    conversation: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, path) = config::load_config(config_path)?;
    let keys = key_store(&path);
    if keys.get_api_key().await.is_none() {
        anyhow::bail!("no API key configured; run `claudette set-key` or set ANTHROPIC_API_KEY");
    }

    let workspace = config::resolve_workspace_dir(&config, &path);
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;
    let tools = ToolRegistry::with_default_tools(
        Arc::new(LocalFileSystem::new(&workspace)),
        Some(workspace.clone()),
    );
    log::info!("chat: tools {}", tools.tool_names().join(", "));
    let store = Arc::new(open_store(&config, &path).await);
    let settings = config::agent_settings(&config, model.as_deref());
    log::info!("chat: model {}, workspace {}", settings.model, workspace.display());
    let agent = Arc::new(ChatAgent::new(
        store.clone(),
        Arc::new(client(&config, keys)),
        Arc::new(tools),
        settings,
    ));

    let mut current = match conversation {
        Some(id) => {
            let conv = store
                .get_conversation(&id)
                .await
                .with_context(|| format!("conversation {} not found", id))?;
            println!("continuing \"{}\" ({} messages)", conv.title, conv.message_count);
            Some(conv.id)
        }
        None => None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut renderer = render::Renderer::default();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        let conversation_id = match &current {
            Some(id) => id.clone(),
            None => {
                let title: String = input.chars().take(TITLE_CHARS).collect();
                let conv = store.create_conversation(title).await?;
                log::info!("chat: created conversation {}", conv.id);
                current = Some(conv.id.clone());
                conv.id
            }
        };

        let (mut snapshots, handle) =
            agent.spawn_send(conversation_id, input.to_string(), SNAPSHOT_BUFFER);
        while let Some(message) = snapshots.recv().await {
            renderer.render(&message, &mut stdout)?;
        }
        match handle.await {
            Ok(Ok(summary)) => log::debug!(
                "chat: turn finished after {} request(s), stop reason {}",
                summary.iterations,
                summary.stop_reason.as_deref().unwrap_or("none")
            ),
            Ok(Err(e)) => eprintln!("\nchat error: {}", e),
            Err(e) => eprintln!("\nchat error: {}", e),
        }
    }
    Ok(())
}

async fn run_conversations(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let store = open_store(&config, &path).await;
    let mut conversations = store.list_conversations().await;
    if conversations.is_empty() {
        println!("no conversations");
        return Ok(());
    }
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    for c in conversations {
        let updated = chrono::DateTime::from_timestamp_millis(c.updated_at)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}  {}  {:>4}  {}", c.id, updated, c.message_count, c.title);
    }
    Ok(())
}

async fn run_delete(config_path: Option<PathBuf>, id: String) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let store = open_store(&config, &path).await;
    if store.get_conversation(&id).await.is_none() {
        anyhow::bail!("conversation {} not found", id);
    }
    store.delete_conversation(&id).await?;
    println!("deleted {}", id);
    Ok(())
}

async fn run_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let models = client(&config, key_store(&path)).list_models().await?;
    for m in models {
        println!("{}  {}", m.id, m.display_name);
    }
    Ok(())
}

async fn run_set_key(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, path) = config::load_config(config_path)?;
    print!("API key: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let key = line.trim();
    if !looks_like_api_key(key) {
        anyhow::bail!("that does not look like an API key (expected sk-ant-...)");
    }

    let store = FileKeyStore::in_config_dir(&config::config_dir(&path));
    let valid = client(&config, key_store(&path))
        .validate_api_key(key)
        .await
        .context("checking API key")?;
    if !valid {
        anyhow::bail!("the API rejected this key");
    }
    store.set_api_key(key).await?;
    println!("saved API key to {}", store.path().display());
    Ok(())
}
