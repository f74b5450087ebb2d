//! courier CLI — operator interface to the delivery queue.

use clap::{Parser, Subcommand};
use courier_rs::clock::SystemClock;
use courier_rs::config::{ChannelRegistry, Config, DeliveryConfig};
use courier_rs::coordinator::Coordinator;
use courier_rs::model::{NewMessage, Status};
use courier_rs::store::{PgStore, QueueStore};
use courier_rs::telemetry::{TelemetryConfig, init_telemetry};
use courier_rs::transport::HookTransport;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "courier", about = "Durable outbound-message delivery")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the delivery workers
    Serve {
        /// Directory containing channel TOML configs
        #[arg(long, default_value = "channels")]
        channels: PathBuf,
    },
    /// Enqueue a message
    Enqueue {
        /// Recipient (session id, email address, ...)
        recipient: String,
        /// Message content
        content: String,
        /// Pin delivery to a specific channel
        #[arg(long)]
        channel: Option<String>,
        /// Override the retry budget for this message
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// List messages
    List {
        /// Filter by status (pending, processing, sent, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum messages to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a message
    Show {
        /// Message ID (full UUID or prefix)
        id: String,
    },
    /// Return abandoned processing messages to the pending pool
    Sweep {
        /// Reclaim messages untouched for at least this many seconds
        #[arg(long, default_value_t = 3600)]
        older_than: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { channels } => cmd_serve(channels).await,
        command => {
            let config = Config::from_env()?;
            let store = PgStore::connect(config.database_url.expose_secret()).await?;
            store.migrate().await?;

            match command {
                Command::Serve { .. } => unreachable!(),
                Command::Enqueue {
                    recipient,
                    content,
                    channel,
                    max_attempts,
                } => cmd_enqueue(&store, recipient, content, channel, max_attempts).await,
                Command::List { status, limit } => cmd_list(&store, status, limit).await,
                Command::Show { id } => cmd_show(&store, id).await,
                Command::Sweep { older_than } => cmd_sweep(&store, older_than).await,
            }
        }
    }
}

async fn cmd_serve(channels: PathBuf) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "courier".to_string(),
    })?;

    let store = PgStore::connect(config.database_url.expose_secret()).await?;
    store.migrate().await?;

    let registry = ChannelRegistry::load_from_dir(&channels)?;
    let transport = HookTransport::from_registry(&registry)?;

    let mut coordinator = Coordinator::new(
        registry,
        Arc::new(store),
        Arc::new(transport),
        Arc::new(SystemClock),
        DeliveryConfig::default(),
    );

    coordinator.start().await?;
    tokio::signal::ctrl_c().await.ok();
    coordinator.shutdown();
    coordinator.join().await;
    Ok(())
}

async fn cmd_enqueue(
    store: &PgStore,
    recipient: String,
    content: String,
    channel: Option<String>,
    max_attempts: Option<u32>,
) -> anyhow::Result<()> {
    let mut new = NewMessage::new(recipient, content);
    if let Some(ref name) = channel {
        new = new.channel(name.as_str());
    }
    if let Some(n) = max_attempts {
        new = new.max_attempts(n);
    }

    let message = store.enqueue(new, chrono::Utc::now()).await?;
    println!("Enqueued: {} (status: {})", message.id, message.status);
    Ok(())
}

async fn cmd_list(store: &PgStore, status: Option<String>, limit: i64) -> anyhow::Result<()> {
    let status_filter: Option<Status> = match status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid status: {s}"))?,
        ),
        None => None,
    };

    let messages = store.list(status_filter, limit).await?;

    if messages.is_empty() {
        println!("No messages found.");
        return Ok(());
    }

    // Header
    println!(
        "{:<8}  {:<10}  {:<12}  {:<4}  {:<25}  SCHEDULED",
        "ID", "STATUS", "CHANNEL", "TRY", "RECIPIENT"
    );
    println!("{}", "-".repeat(90));

    for message in &messages {
        let channel = message
            .channel
            .as_ref()
            .map(|c| c.as_str())
            .unwrap_or("-");
        let recipient = if message.recipient.len() > 25 {
            &message.recipient[..25]
        } else {
            &message.recipient
        };
        println!(
            "{:<8}  {:<10}  {:<12}  {:<4}  {:<25}  {}",
            message.id,
            message.status.to_string(),
            channel,
            message.attempts,
            recipient,
            message.scheduled_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} message(s)", messages.len());
    Ok(())
}

async fn cmd_show(store: &PgStore, id_str: String) -> anyhow::Result<()> {
    // Support prefix matching — find the message whose ID starts with the given string
    let id = if id_str.len() < 36 {
        let messages = store.list(None, 100).await?;
        let matches: Vec<_> = messages
            .iter()
            .filter(|m| m.id.0.to_string().starts_with(&id_str))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no message matching prefix '{id_str}'"),
            1 => matches[0].id,
            n => anyhow::bail!("{n} messages match prefix '{id_str}' — be more specific"),
        }
    } else {
        let uuid = uuid::Uuid::parse_str(&id_str)?;
        courier_rs::model::MessageId(uuid)
    };

    let message = store.get(id).await?;

    println!("ID:         {}", message.id.0);
    println!("Status:     {}", message.status);
    println!("Recipient:  {}", message.recipient);
    println!(
        "Channel:    {}",
        message
            .channel
            .as_ref()
            .map(|c| c.as_str())
            .unwrap_or("unassigned")
    );
    println!("Attempts:   {}", message.attempts);
    println!(
        "Max Tries:  {}",
        message
            .max_attempts
            .map(|n| n.to_string())
            .unwrap_or("-".to_string())
    );
    println!("Scheduled:  {}", message.scheduled_at);
    println!("Created:    {}", message.created_at);
    println!("Updated:    {}", message.updated_at);
    if let Some(at) = message.last_attempt_at {
        println!("Last Try:   {at}");
    }
    if let Some(at) = message.failed_at {
        println!("Failed:     {at}");
    }
    if let Some(ref err) = message.error {
        println!("Error:      {err}");
    }
    println!("---");
    println!("{}", message.content);

    Ok(())
}

async fn cmd_sweep(store: &PgStore, older_than: i64) -> anyhow::Result<()> {
    let reclaimed = store
        .reclaim_stale(chrono::Duration::seconds(older_than), chrono::Utc::now())
        .await?;
    println!("Reclaimed {reclaimed} abandoned message(s)");
    Ok(())
}
