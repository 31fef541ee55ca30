// assistant-link: send one chat message and print the streamed reply.
//
// Signs in (restoring stored credentials when possible), then talks to the
// assistant over the realtime socket or, with --http, the chunked-HTTP stream.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::mpsc;

use assistant_link::connection::ConnectionState;
use assistant_link::stream::{SendOptions, StreamHandlers};
use assistant_link::{AssistantClient, ClientOptions};

#[derive(Parser)]
#[command(name = "assistant-link")]
#[command(about = "Chat with the assistant backend from the terminal", long_about = None)]
#[command(version)]
struct Cli {
    /// REST API base URL
    #[arg(long, env = "ASSISTANT_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Realtime socket URL
    #[arg(long, env = "ASSISTANT_WS_URL", default_value = "ws://localhost:8000/ws/chat")]
    ws_url: String,

    /// Account email (needed when no stored session is valid)
    #[arg(long, env = "ASSISTANT_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(long, env = "ASSISTANT_PASSWORD")]
    password: Option<String>,

    /// File used to persist credentials between runs
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Use the chunked-HTTP transport instead of the socket
    #[arg(long)]
    http: bool,

    /// Seconds to wait for the socket to connect
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Message to send
    message: String,
}

enum Finished {
    Complete,
    Failed(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut builder = ClientOptions::builder()
        .api_base_url(&cli.api_url)
        .ws_url(&cli.ws_url)
        .connect_timeout(Duration::from_secs(cli.connect_timeout));
    if let Some(path) = &cli.credentials {
        builder = builder.credentials_path(path);
    }
    let client = AssistantClient::new(builder.build()).context("failed to create client")?;

    if !client.restore_session().await? {
        let (Some(email), Some(password)) = (&cli.email, &cli.password) else {
            bail!("no stored session; pass --email and --password");
        };
        client
            .login(email, password)
            .await
            .context("login failed")?;
    }
    client.start_session_monitor();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let complete_tx = done_tx.clone();
    let handlers = StreamHandlers::new()
        .on_update(|_, delta| {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        })
        .on_complete(move |_| {
            let _ = complete_tx.send(Finished::Complete);
        })
        .on_error(move |failure| {
            let _ = done_tx.send(Finished::Failed(failure.error.clone()));
        });

    let outcome = if cli.http {
        let chat = client.http_chat(handlers)?;
        let task = chat.send_message(cli.message.as_str(), None)?;
        let outcome = done_rx.recv().await;
        task.wait().await;
        outcome
    } else {
        client.connect();
        client
            .connection()
            .wait_for(
                ConnectionState::Connected,
                Duration::from_secs(cli.connect_timeout),
            )
            .await
            .context("socket did not connect")?;

        let chat = client.socket_chat(handlers);
        if !chat.send_message(cli.message.as_str(), SendOptions::default()) {
            bail!("message was not sent");
        }
        done_rx.recv().await
    };

    println!();
    client.shutdown().await;

    match outcome {
        Some(Finished::Complete) => Ok(()),
        Some(Finished::Failed(error)) => bail!("response failed: {error}"),
        None => bail!("stream ended without a result"),
    }
}
