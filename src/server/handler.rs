use super::Shared;
use crate::action::{self, Action};
use crate::error::HandlerError;
use crate::executor::{CommandExecutor, RunningCommand};
use crate::protocol::{self, GOODBYE};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Served {
        processing: Duration,
        roundtrip: Duration,
    },
    Shutdown,
}

/// Performs the single request/response exchange on an accepted connection.
///
/// Any error drops the stream without a reply, which closes it.
pub(super) async fn handle_connection<T, E>(
    io: T,
    shared: &Shared<E>,
) -> Result<Outcome, HandlerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    E: CommandExecutor,
{
    let mut stream = protocol::framed(io);

    let request = protocol::recv_message(&mut stream, shared.io_timeout).await?;
    // the peer may have dawdled before sending; that time is not ours
    let start = Instant::now();

    let code = action::parse_action_code(&request)?;
    let command = match shared.catalog.resolve(code)? {
        Action::Command(command) => command,
        Action::Shutdown => {
            let sent = protocol::send_message(&mut stream, GOODBYE, shared.io_timeout).await;
            shared.handle.stop();
            sent?;
            protocol::close(&mut stream).await?;
            return Ok(Outcome::Shutdown);
        }
    };

    debug!("Dispatching action {} (`{}`)", code, command);
    let running = shared.executor.spawn(&command)?;
    let processing = start.elapsed();
    shared.aggregator.add_processing_time(processing).await;

    let output = running.collect().await?;
    protocol::send_message(&mut stream, &protocol::reply(&output), shared.io_timeout).await?;
    let roundtrip = start.elapsed();
    shared.aggregator.add_roundtrip_time(roundtrip).await;

    protocol::close(&mut stream).await?;
    Ok(Outcome::Served {
        processing,
        roundtrip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Catalog;
    use crate::error::{ExecutionError, ProtocolError};
    use crate::executor::fake::FakeExecutor;
    use crate::server::{RunState, ServerHandle};
    use crate::stats::Aggregator;
    use std::sync::Arc;
    use tokio::io::duplex;

    fn shared(executor: FakeExecutor) -> Shared<FakeExecutor> {
        Shared {
            catalog: Catalog::default(),
            executor,
            aggregator: Arc::new(Aggregator::new()),
            handle: ServerHandle::new(),
            io_timeout: Duration::from_secs(2),
        }
    }

    fn request_frame(payload: &str) -> Vec<u8> {
        let body = protocol::encode(payload).unwrap();
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&body);
        frame
    }

    async fn exchange(
        shared: &Shared<FakeExecutor>,
        payload: &str,
    ) -> (Result<Outcome, HandlerError>, Option<String>) {
        let (client, server) = duplex(4096);
        let mut client = protocol::framed(client);
        protocol::send_message(&mut client, payload, Duration::from_secs(1))
            .await
            .unwrap();

        let outcome = handle_connection(server, shared).await;
        let reply = protocol::recv_message(&mut client, Duration::from_secs(1))
            .await
            .ok();
        (outcome, reply)
    }

    #[tokio::test]
    async fn command_reply_carries_marker_and_output() {
        let shared = shared(FakeExecutor::new().with_output("up 4 days\n"));
        let (outcome, reply) = exchange(&shared, "2").await;

        let Outcome::Served {
            processing,
            roundtrip,
        } = outcome.unwrap()
        else {
            panic!("expected a served exchange");
        };
        assert!(roundtrip >= processing);
        assert_eq!(reply.unwrap(), "From server: up 4 days\n");

        let totals = shared.aggregator.snapshot().await;
        assert_eq!(totals.total_connections, 1);
        assert_eq!(totals.total_processing_time, processing);
        assert_eq!(totals.total_roundtrip_time, roundtrip);
    }

    #[tokio::test]
    async fn processing_excludes_output_drain() {
        let drain = Duration::from_millis(60);
        let shared = shared(FakeExecutor::new().with_drain_delay(drain));
        let (outcome, _) = exchange(&shared, "1").await;

        let Outcome::Served {
            processing,
            roundtrip,
        } = outcome.unwrap()
        else {
            panic!("expected a served exchange");
        };
        assert!(processing < drain);
        assert!(roundtrip >= drain);
    }

    #[tokio::test]
    async fn shutdown_says_goodbye_and_stops() {
        let shared = shared(FakeExecutor::new());
        let (outcome, reply) = exchange(&shared, "7").await;

        assert_eq!(outcome.unwrap(), Outcome::Shutdown);
        assert_eq!(reply.unwrap(), "Goodbye");
        assert_eq!(shared.handle.state(), RunState::Stopping);
        assert_eq!(shared.aggregator.snapshot().await.total_connections, 0);
        assert_eq!(shared.executor.spawned(), 0);
    }

    #[tokio::test]
    async fn out_of_range_code_gets_no_reply() {
        let shared = shared(FakeExecutor::new());
        let (outcome, reply) = exchange(&shared, "9").await;

        assert!(matches!(
            outcome,
            Err(HandlerError::Protocol(ProtocolError::InvalidAction(9)))
        ));
        assert!(reply.is_none());
        assert_eq!(shared.handle.state(), RunState::Running);
    }

    #[tokio::test]
    async fn non_numeric_request_writes_nothing() {
        // the mock panics on any write it was not told to expect
        let mock = tokio_test::io::Builder::new()
            .read(&request_frame("uptime"))
            .build();

        let shared = shared(FakeExecutor::new());
        let outcome = handle_connection(mock, &shared).await;
        assert!(matches!(
            outcome,
            Err(HandlerError::Protocol(ProtocolError::NotANumber(_)))
        ));
        assert_eq!(shared.aggregator.snapshot().await.total_connections, 0);
    }

    #[tokio::test]
    async fn executor_failure_aborts_without_reply() {
        let shared = shared(FakeExecutor::failing());
        let (outcome, reply) = exchange(&shared, "3").await;

        assert!(matches!(
            outcome,
            Err(HandlerError::Execution(ExecutionError::Other(_)))
        ));
        assert!(reply.is_none());
        assert_eq!(shared.aggregator.snapshot().await.total_connections, 0);
    }

    #[tokio::test]
    async fn command_dying_mid_drain_is_not_counted() {
        let shared = shared(FakeExecutor::new().with_drain_failure("date"));
        let (outcome, reply) = exchange(&shared, "1").await;

        assert!(matches!(
            outcome,
            Err(HandlerError::Execution(ExecutionError::Other(_)))
        ));
        assert!(reply.is_none());

        let totals = shared.aggregator.snapshot().await;
        assert_eq!(totals.dispatched, 1);
        assert_eq!(totals.total_connections, 0);
        assert_eq!(totals.total_roundtrip_time, Duration::ZERO);
        assert_eq!(shared.aggregator.summarize().await.total_connections(), 0);
    }
}
