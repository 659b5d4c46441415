//! Moxie Chat - terminal client for a Moxie assistant
//!
//! Reads lines from stdin, streams replies to stdout and keeps the
//! conversation id in a local SQLite file so it survives restarts.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moxie_chat::client::{ChatClient, KnowledgeClient};
use moxie_chat::config::{ClientConfig, Config};
use moxie_chat::core::{
    ChatEngine, InMemoryStore, KnowledgeStore, SessionIdentity, SqliteStore, TurnUpdate,
};

mod commands;

use commands::{Command, KnowledgeCommand, HELP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with the reply text
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moxie_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env()?;
    let client_config = match &config.config_file {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    config.merge(&client_config);

    let identity = open_identity(&config, &client_config).await;
    let backend = Arc::new(ChatClient::new(config.base_url.clone(), config.transport()));
    let mut engine = ChatEngine::new(
        backend,
        identity,
        client_config.conversation.engine_config(),
    )
    .await;
    let mut knowledge = KnowledgeStore::new(
        KnowledgeClient::new(config.base_url.clone()).with_timeout(config.transport().timeout),
    );

    info!("🔥 Moxie chat connected to {}", config.base_url);
    print_last(&engine);

    run(&mut engine, &mut knowledge).await
}

async fn open_identity(config: &Config, client_config: &ClientConfig) -> SessionIdentity {
    if !client_config.storage.enabled {
        return SessionIdentity::ephemeral();
    }

    let path = config.state_db_path(client_config);
    match SqliteStore::new(&path).await {
        Ok(store) => SessionIdentity::new(Arc::new(store)),
        Err(e) => {
            warn!("Local state unavailable at {}: {}", path.display(), e);
            SessionIdentity::new(Arc::new(InMemoryStore::new()))
        }
    }
}

async fn run(engine: &mut ChatEngine, knowledge: &mut KnowledgeStore) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    loop {
        tokio::select! {
            update = engine.next_update(), if engine.is_busy() => {
                render(engine, update)?;
                if !engine.is_busy() {
                    prompt()?;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                if command == Command::Quit {
                    break;
                }
                handle(command, engine, knowledge).await?;
                if !engine.is_busy() {
                    prompt()?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if !engine.cancel() {
                    break;
                }
                println!("\n[cancelled]");
                prompt()?;
            }
        }
    }

    engine.cancel();
    Ok(())
}

async fn handle(
    command: Command,
    engine: &mut ChatEngine,
    knowledge: &mut KnowledgeStore,
) -> anyhow::Result<()> {
    match command {
        Command::Chat(text) => {
            if engine.submit(&text) {
                print!("moxie: ");
                std::io::stdout().flush()?;
            } else {
                println!("A reply is still streaming; /cancel stops it.");
            }
        }
        Command::Ask(text) => {
            if engine.submit_blocking(&text).await {
                print_last(engine);
            } else {
                println!("A reply is still streaming; /cancel stops it.");
            }
        }
        Command::Cancel => {
            if engine.cancel() {
                println!("\n[cancelled]");
            } else {
                println!("Nothing to cancel.");
            }
        }
        Command::Clear => match engine.clear().await {
            Ok(()) => print_last(engine),
            Err(e) => println!("[error] Could not clear the conversation: {}", e),
        },
        Command::New => {
            let id = engine.new_conversation().await.to_string();
            println!("Started conversation {}", id);
            print_last(engine);
        }
        Command::Knowledge(kb) => handle_knowledge(kb, knowledge).await,
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
        Command::Unknown(line) => println!("Unknown command {:?}, try /help", line),
    }

    Ok(())
}

async fn handle_knowledge(command: KnowledgeCommand, knowledge: &mut KnowledgeStore) {
    match command {
        KnowledgeCommand::List => {
            knowledge.load_entries().await;
            if !knowledge.has_knowledge() {
                println!("The knowledge base is empty.");
            }
            for entry in knowledge.entries() {
                println!(
                    "{}  {} ({} segments, {} chars)",
                    entry.id, entry.title, entry.segment_count, entry.content_length
                );
            }
        }
        KnowledgeCommand::Stats => {
            knowledge.load_stats().await;
            let stats = knowledge.stats();
            println!(
                "{} entries, {} segments, {} chars, model {}",
                stats.total_entries,
                stats.total_segments,
                stats.total_characters,
                stats.embedding_model
            );
        }
        KnowledgeCommand::Add { title, content } => {
            if knowledge.add(&title, &content).await {
                println!("Added {:?}.", title);
            } else {
                println!("Could not add the entry.");
            }
        }
        KnowledgeCommand::Delete(id) => {
            if knowledge.delete(&id).await {
                println!("Deleted {}.", id);
            } else {
                println!("Could not delete {}.", id);
            }
        }
        KnowledgeCommand::Show(id) => match knowledge.detail(&id).await {
            Some(detail) => {
                println!("{} ({} segments)", detail.title, detail.segment_count);
                for segment in &detail.segments {
                    println!("  - {}", segment);
                }
            }
            None => println!("No entry {}.", id),
        },
        KnowledgeCommand::Search(query) => {
            let results = knowledge.search(&query).await;
            if results.is_empty() {
                println!("No matches.");
            }
            for hit in results {
                println!("[{:.2}] {}", hit.score, hit.content);
            }
        }
    }
}

/// Print one turn update as it arrives
fn render(engine: &ChatEngine, update: Option<TurnUpdate>) -> std::io::Result<()> {
    let Some(update) = update else {
        return Ok(());
    };

    let mut stdout = std::io::stdout();
    let message = engine.transcript().get(update.message_id());
    match update {
        TurnUpdate::Token { piece, .. } => {
            write!(stdout, "{}", piece)?;
            stdout.flush()?;
        }
        TurnUpdate::Completed { .. } => writeln!(stdout)?,
        TurnUpdate::Failed { error, .. } => {
            // Nothing was printed yet when the placeholder holds only the error
            let shown = message.map(|m| m.content.as_str()).unwrap_or_default();
            if shown == error {
                writeln!(stdout, "[error] {}", error)?;
            } else {
                writeln!(stdout, "\n[error] {}", error)?;
            }
        }
    }
    Ok(())
}

fn print_last(engine: &ChatEngine) {
    if let Some(message) = engine.last_message() {
        if message.is_error {
            println!("[error] {}", message.content);
        } else {
            println!("moxie: {}", message.content);
        }
    }
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}
