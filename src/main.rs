use std::error::Error;
use std::io::Write;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::mpsc;

use kidconnect::common::NetworkCommand;
use kidconnect::config;
use kidconnect::network::ChatEngine;
use kidconnect::ui::ConsoleMenu;

#[derive(Parser)]
#[command(
    name = "kidconnect",
    version,
    about = "Presence and chat negotiation peer over MQTT"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Peer identity; doubles as the MQTT client id. Prompted if omitted.
    #[arg(long)]
    user: Option<String>,
    /// Broker host (overrides the config file)
    #[arg(long)]
    broker: Option<String>,
    /// Broker port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if let Some(host) = cli.broker {
        app_config.broker_host = host;
    }
    if let Some(port) = cli.port {
        app_config.broker_port = port;
    }

    let user = match cli.user {
        Some(user) if valid_identity(&user) => user,
        Some(user) => {
            eprintln!("Invalid user id '{user}': no whitespace or /+# allowed");
            std::process::exit(1);
        }
        None => ask_user_id()?,
    };

    // Console -> engine
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Engine -> console
    let (event_tx, event_rx) = mpsc::channel(100);

    let engine = ChatEngine::new(user.clone(), app_config, event_tx, cmd_rx);
    let engine_handle = tokio::spawn(engine.run());

    let menu = ConsoleMenu::new(user, cmd_tx.clone(), event_rx);
    tokio::select! {
        // The menu sends Shutdown itself when the user quits.
        _ = menu.run() => {}
        _ = tokio::signal::ctrl_c() => {
            // Drops the outstanding prompt; the engine still runs its full
            // offline sequence below.
            log::info!("Interrupted, shutting down");
            let _ = cmd_tx.send(NetworkCommand::Shutdown).await;
        }
    }

    match engine_handle.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            log::error!("Engine terminated: {err}");
            Err(err)
        }
        Err(err) => Err(err.into()),
    }
}

/// Peer ids end up as MQTT client ids and topic segments, so topic
/// metacharacters and whitespace are rejected up front. Same charset the
/// engine applies to chat targets and group names.
fn valid_identity(id: &str) -> bool {
    kidconnect::network::topics::is_topic_safe(id)
}

fn ask_user_id() -> std::io::Result<String> {
    loop {
        print!("Enter your user id: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        let id = line.trim();
        if valid_identity(id) {
            return Ok(id.to_string());
        }
        println!("User ids must be non-empty, without whitespace or /+#");
    }
}
