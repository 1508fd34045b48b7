//! One length-prefixed frame in each direction per connection.
//!
//! Each frame carries a bincode-encoded string: the decimal action code from
//! the client, and either [`GOODBYE`] or a [`REPLY_MARKER`]-prefixed command
//! output from the server.

use crate::error::{ConnectionError, HandlerError, ProtocolError};
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use socket2::TcpKeepalive;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub const GOODBYE: &str = "Goodbye";
pub const REPLY_MARKER: &str = "From server: ";

const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Idle time before the first keepalive packet on a connection.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub type MessageStream<T> = Framed<T, LengthDelimitedCodec>;

pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> MessageStream<T> {
    LengthDelimitedCodec::builder()
        .length_field_type::<u32>()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_framed(io)
}

pub fn encode(message: &str) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(bincode::serialize(message)?))
}

pub fn decode(frame: &[u8]) -> Result<String, ProtocolError> {
    Ok(bincode::deserialize(frame)?)
}

/// Builds the server's reply for captured command output.
pub fn reply(output: &str) -> String {
    format!("{}{}", REPLY_MARKER, output)
}

/// Reads exactly one message, giving up after `timeout`.
pub async fn recv_message<T>(
    stream: &mut MessageStream<T>,
    timeout: Duration,
) -> Result<String, HandlerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = time::timeout(timeout, stream.next())
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
        .ok_or(ProtocolError::Closed)?
        .map_err(ProtocolError::Frame)?;

    Ok(decode(&frame)?)
}

pub async fn send_message<T>(
    stream: &mut MessageStream<T>,
    message: &str,
    timeout: Duration,
) -> Result<(), HandlerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    time::timeout(timeout, stream.send(frame))
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))?
        .map_err(ConnectionError::Io)?;
    Ok(())
}

/// Flushes and shuts down the write side.
pub async fn close<T>(stream: &mut MessageStream<T>) -> Result<(), ConnectionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    SinkExt::<Bytes>::close(stream).await?;
    Ok(())
}

/// Disables Nagle so the single small request is sent at once, and turns on
/// keepalive so a vanished peer is noticed while a command runs.
pub fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;

    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL);
    socket2::SockRef::from(stream).set_tcp_keepalive(&keepalive)?;

    Ok(())
}
