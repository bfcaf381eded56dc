use clap::Parser;
use mqttbroker::config::{BrokerConfig, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = BrokerConfig::from(cli);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = mqttbroker::server::run(config).await {
        tracing::error!(error = %e, "broker exited with error");
        std::process::exit(1);
    }
}
