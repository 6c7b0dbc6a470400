use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wust_hijack::{
    CloseFrame, Config, Error, Message, MessageHandler, UpgradeError, UpgradeRequest,
    WebSocketServer,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    addr: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 9001)]
    port: u16,

    /// Largest frame payload in bytes
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_frame: usize,

    /// Largest reassembled message in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    max_message: usize,

    /// Seconds without a frame before the connection is closed
    #[arg(long)]
    read_timeout: Option<u64>,

    /// Seconds between keepalive pings
    #[arg(long)]
    ping_interval: Option<u64>,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            max_frame_payload: self.max_frame,
            max_message_size: self.max_message,
            read_timeout: self.read_timeout.map(Duration::from_secs),
            ping_interval: self.ping_interval.map(Duration::from_secs),
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), UpgradeError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("wust_hijack=info".parse().unwrap()),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    WebSocketServer::bind((args.addr.as_str(), args.port), args.config())
        .await?
        .run(EchoHandler)
        .await;

    Ok(())
}

struct EchoHandler;
#[async_trait::async_trait]
impl MessageHandler for EchoHandler {
    async fn on_open(&self, request: &UpgradeRequest) {
        println!("client connected on {}", request.target);
    }

    async fn on_text(&self, s: String) -> Option<Message> {
        let head: String = s.chars().take(10).collect();
        println!("got message T {} {head:?}", s.len());
        Some(Message::Text(s))
    }

    async fn on_binary(&self, b: Vec<u8>) -> Option<Message> {
        let l = b.len().min(10);
        println!("got messsage B {} {:?}", b.len(), &b[..l]);
        Some(Message::Binary(b))
    }

    async fn on_close(&self, close: Option<CloseFrame>) {
        println!("client closed {close:?}");
    }

    async fn on_error(&self, e: Error) {
        eprintln!("client error {e}");
    }

    async fn on_pong(&self, latency: Option<u16>) {
        if let Some(latency) = latency {
            println!("pong latency {latency}ms");
        }
    }
}
