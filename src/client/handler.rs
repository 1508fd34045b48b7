use crate::config::ClientConfig;
use crate::error::{ConnectionError, HandlerError};
use crate::protocol::{self, GOODBYE};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Reply { body: String, elapsed: Duration },
    Goodbye,
}

pub async fn connect(addr: &str, config: &ClientConfig) -> Result<TcpStream, ConnectionError> {
    let timeout = config.connect_timeout();
    let socket = time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
        .map_err(|source| ConnectionError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    if let Err(e) = protocol::configure_stream(&socket) {
        debug!("Could not tune socket to {}: {}", addr, e);
    }
    Ok(socket)
}

/// Sends one action code and waits for the server's single reply.
///
/// The clock starts once the request has been written, so `elapsed` is the
/// wait for the reply and excludes our own send.
pub async fn exchange<T>(io: T, code: u8, timeout: Duration) -> Result<Exchange, HandlerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = protocol::framed(io);

    protocol::send_message(&mut stream, &code.to_string(), timeout).await?;
    let start = Instant::now();
    let response = protocol::recv_message(&mut stream, timeout).await?;
    let elapsed = start.elapsed();

    if response == GOODBYE {
        return Ok(Exchange::Goodbye);
    }

    // the server has already hung up, so failing to shut down our side is harmless
    if let Err(e) = protocol::close(&mut stream).await {
        debug!("Close after reply failed: {}", e);
    }
    Ok(Exchange::Reply {
        body: response,
        elapsed,
    })
}

/// Connects, exchanges and prints the result of one client connection.
pub(super) async fn run(
    addr: &str,
    code: u8,
    config: &ClientConfig,
) -> Result<Exchange, HandlerError> {
    let socket = connect(addr, config).await.inspect_err(|_| {
        println!("Unable to connect to server {}", addr);
    })?;

    let result = exchange(socket, code, config.response_timeout()).await?;
    if let Exchange::Reply { body, elapsed } = &result {
        println!("{}", render(body, *elapsed));
    }
    Ok(result)
}

pub fn render(body: &str, elapsed: Duration) -> String {
    format!(
        "Message Received: [\n\n{}\n\n]. - Total time for this request: {}ms.",
        body.trim(),
        elapsed.as_millis()
    )
}
