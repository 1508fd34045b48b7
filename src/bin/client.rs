use anyhow::{Context, Result};
use net_timing::action::{MAX_CODE, MIN_CODE, SHUTDOWN_CODE};
use net_timing::client::MAX_CONNECTIONS;
use net_timing::config::{self, Config};
use net_timing::{Catalog, Launcher};
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "net_timing=warn".into()),
        )
        .init();

    let mut config = Config::load_or_default(config::DEFAULT_CONFIG_PATH)?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let args: Vec<String> = std::env::args().skip(1).collect();
    config.client.server_addr = if args.len() < 2 {
        let host = config
            .client
            .server_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| config.client.server_addr.clone());
        let Some(port) = prompt::<u16>(&mut input, "Enter port: ", |_| true).await? else {
            return Ok(());
        };
        format!("{}:{}", host, port)
    } else {
        let port: u16 = args[1]
            .parse()
            .with_context(|| format!("invalid port {:?}", args[1]))?;
        format!("{}:{}", args[0], port)
    };

    let launcher = Launcher::new(config.client);
    loop {
        println!("{}", Catalog::menu());

        let select = format!("Enter # of selection ({}-{}): ", MIN_CODE, MAX_CODE);
        let Some(action) = prompt(&mut input, &select, |a: &u8| (MIN_CODE..=MAX_CODE).contains(a)).await?
        else {
            break;
        };

        // one shutdown is enough: the server stops accepting after the first
        if action == SHUTDOWN_CODE {
            launcher.launch(1, SHUTDOWN_CODE).await?;
            break;
        }

        let clients = format!("Enter # of clients (min 1, max {}): ", MAX_CONNECTIONS);
        let Some(count) = prompt(&mut input, &clients, |n: &usize| {
            (1..=MAX_CONNECTIONS).contains(n)
        })
        .await?
        else {
            break;
        };

        let report = launcher.launch(count, action).await?;
        println!("{}", report);
    }

    Ok(())
}

/// Asks until a valid value is entered. `None` means standard input closed.
async fn prompt<T: FromStr>(
    input: &mut Input,
    text: &str,
    valid: impl Fn(&T) -> bool,
) -> Result<Option<T>> {
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = input.next_line().await? else {
            return Ok(None);
        };
        if let Ok(value) = line.trim().parse::<T>() {
            if valid(&value) {
                return Ok(Some(value));
            }
        }
    }
}
