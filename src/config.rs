use clap::Parser;

/// Runtime configuration for the broker binary.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bind: String,
    pub port: u16,
    pub enable_cache: bool,
    pub stream_buffer_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 1883,
            enable_cache: false,
            stream_buffer_capacity: 1024,
        }
    }
}

impl BrokerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "mqttbroker", about = "A small MQTT 3.1.1 broker")]
pub struct Cli {
    /// Address to bind the listener to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 1883)]
    pub port: u16,

    /// Enable the per-topic payload re-encode cache.
    #[arg(long)]
    pub cache: bool,

    /// Per-connection framing buffer capacity, in bytes.
    #[arg(long, default_value_t = 1024)]
    pub buffer: usize,
}

impl From<Cli> for BrokerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            bind: cli.bind,
            port: cli.port,
            enable_cache: cli.cache,
            stream_buffer_capacity: cli.buffer,
        }
    }
}
