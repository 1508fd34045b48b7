use anyhow::{Context, Result};
use net_timing::config::{self, Config};
use net_timing::{Catalog, Server, SystemExecutor};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "net_timing=debug,info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() > 1 {
        println!("Usage: net-timing <port>");
        return Ok(());
    }

    let mut config = Config::load_or_default(config::DEFAULT_CONFIG_PATH)?;
    let catalog = Catalog::with_overrides(&config.actions)?;

    let port = match args.first() {
        Some(arg) => arg.parse().with_context(|| format!("invalid port {:?}", arg))?,
        None => prompt_port().await?,
    };
    config.server.listen_addr.set_port(port);

    println!("Starting server on port #{}", port);
    let server = Server::bind(&config.server, catalog, SystemExecutor).await?;
    let summary = server.run().await?;

    println!("{}", summary);
    info!("Server stopped.");
    Ok(())
}

async fn prompt_port() -> Result<u16> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"Enter port: ").await?;
        stdout.flush().await?;
        let line = lines
            .next_line()
            .await?
            .context("no port given on standard input")?;
        if let Ok(port) = line.trim().parse() {
            return Ok(port);
        }
    }
}
