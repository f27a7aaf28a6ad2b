use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use device_gateway::protocol::topics;
use device_gateway::{Config, ConfigOverrides, Daemon};

/// Device Gateway - MQTT device presence registry and command router
#[derive(Parser)]
#[command(name = "device-gateway", version, about)]
struct Cli {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER")]
    broker: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT")]
    port: Option<u16>,

    /// MQTT username
    #[arg(long, env = "MQTT_USERNAME")]
    username: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// HTTP API port
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the subscribed and published topic set
    Topics,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = match cli.verbose {
        0 => "info,device_gateway=info",
        1 => "info,device_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = ConfigOverrides {
        broker: cli.broker,
        mqtt_port: cli.port,
        username: cli.username,
        password: cli.password,
        http_port: cli.http_port,
    };

    let config = Config::load(&overrides)?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(Command::Topics) = cli.command {
        print_topics(&config);
        return Ok(());
    }

    tracing::info!(
        broker = %config.mqtt.broker,
        port = config.mqtt.port,
        http_port = config.server.port,
        "starting device gateway"
    );

    Daemon::new(config).run().await?;

    Ok(())
}

/// Print the topic set for the loaded configuration
fn print_topics(config: &Config) {
    println!("Subscribed:");
    for topic in config.topics.subscriptions() {
        println!("  {topic}");
    }

    println!("\nPublished:");
    println!("  {}", topics::command_topic("{device_id}"));
    println!("  {}", topics::response_topic("{device_id}"));
    println!("  {}", config.topics.legacy_command_topic("{family}"));
}
