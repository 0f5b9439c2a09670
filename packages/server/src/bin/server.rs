//! Group chat server with named rooms.
//!
//! Clients join a room with their first message and receive every message
//! sent to that room afterwards.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin hiroba-server
//! cargo run --bin hiroba-server -- --host 0.0.0.0 --port 3000
//! ```

use std::time::Duration;

use clap::Parser;
use hiroba_server::{config::SessionConfig, hub::Broker, ui::Server};
use hiroba_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "hiroba-server")]
#[command(about = "WebSocket group chat server with named rooms", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Number of outbound messages buffered per client before it is evicted
    #[arg(long, default_value_t = 256)]
    mailbox_capacity: usize,

    /// Seconds to wait for a pong before dropping a client
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pong_wait_secs: u64,

    /// Seconds allowed for writing one message to a client
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    write_wait_secs: u64,

    /// Maximum size of one inbound message, in bytes
    #[arg(long, default_value_t = 512)]
    max_message_size: usize,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig::new(
            self.mailbox_capacity,
            Duration::from_secs(self.pong_wait_secs),
            Duration::from_secs(self.write_wait_secs),
            self.max_message_size,
        )
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let config = args.session_config();
    tracing::debug!("Session config: {:?}", config);

    // The broker loop lives for the whole process
    let broker = Broker::spawn();

    let server = Server::new(broker, config);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

