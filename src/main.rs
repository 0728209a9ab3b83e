use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use battle_core::data;
use battle_server::net;
use battle_server::server::Server;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "0.0.0.0:8446".to_string());
    let server: Arc<Server> = Server::new(data::builtin());
    net::run(server, &addr)
}
