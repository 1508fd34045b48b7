use crate::action::Catalog;
use crate::config::ServerConfig;
use crate::executor::CommandExecutor;
use crate::protocol;
use crate::stats::{Aggregator, SharedAggregator, Summary};
use anyhow::{Result, bail};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, error, info, warn};

mod handler;

pub use handler::Outcome;

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after the given number of consecutive accept failures. Doubles from
/// `ACCEPT_BACKOFF_BASE` and saturates at `ACCEPT_BACKOFF_MAX`, so a
/// persistent error such as fd exhaustion does not spin the loop.
fn accept_backoff(failures: u32) -> Duration {
    let factor = 1u32
        .checked_shl(failures.saturating_sub(1))
        .unwrap_or(u32::MAX);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(factor)
        .min(ACCEPT_BACKOFF_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopping,
    Stopped,
}

/// Cloneable control surface for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    state: Arc<watch::Sender<RunState>>,
}

impl ServerHandle {
    fn new() -> Self {
        let (state, _) = watch::channel(RunState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    /// Asks the accept loop to close the listener. Safe to call any number of
    /// times from any task; only the first call while `Running` has an effect,
    /// and that call returns `true`.
    pub fn stop(&self) -> bool {
        let transitioned = self.state.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Stopping;
                true
            } else {
                false
            }
        });

        if transitioned {
            info!("Stop requested, closing listener");
        } else {
            debug!("Stop requested again, ignoring");
        }
        transitioned
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Resolves once the server has drained its connections and stopped.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == RunState::Stopped).await;
    }

    fn mark_stopped(&self) {
        self.state.send_replace(RunState::Stopped);
    }
}

pub(crate) struct Shared<E> {
    catalog: Catalog,
    executor: E,
    aggregator: SharedAggregator,
    handle: ServerHandle,
    io_timeout: Duration,
}

pub struct Server<E: CommandExecutor> {
    listener: TcpListener,
    shared: Arc<Shared<E>>,
    limiter: Arc<Semaphore>,
}

impl<E: CommandExecutor> Server<E> {
    pub async fn bind(config: &ServerConfig, catalog: Catalog, executor: E) -> Result<Self> {
        if config.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }

        let listener = TcpListener::bind(config.listen_addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                catalog,
                executor,
                aggregator: Arc::new(Aggregator::new()),
                handle: ServerHandle::new(),
                io_timeout: config.io_timeout(),
            }),
            limiter: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        self.shared.handle.clone()
    }

    pub fn aggregator(&self) -> SharedAggregator {
        self.shared.aggregator.clone()
    }

    /// Accepts connections until stopped, then waits for in-flight handlers
    /// and returns the final summary.
    pub async fn run(self) -> Result<Summary> {
        let Self {
            listener,
            shared,
            limiter,
        } = self;
        let mut stop = shared.handle.state.subscribe();
        let mut tasks = JoinSet::new();
        let mut accept_failures = 0u32;

        loop {
            while let Some(res) = tasks.try_join_next() {
                if let Err(e) = res {
                    error!("Connection task failed: {}", e);
                }
            }

            let permit = tokio::select! {
                permit = limiter.clone().acquire_owned() => permit?,
                _ = stop.wait_for(|state| *state != RunState::Running) => break,
            };

            debug!("Waiting for client message...");
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stop.wait_for(|state| *state != RunState::Running) => break,
            };
            let (socket, client_addr) = match accepted {
                Ok(accepted) => {
                    accept_failures = 0;
                    accepted
                }
                Err(e) => {
                    drop(permit);
                    accept_failures = accept_failures.saturating_add(1);
                    let pause = accept_backoff(accept_failures);
                    error!("Failed to accept connection: {} (retrying in {:?})", e, pause);
                    tokio::select! {
                        _ = time::sleep(pause) => continue,
                        _ = stop.wait_for(|state| *state != RunState::Running) => break,
                    }
                }
            };
            debug!("New connection from {}", client_addr);

            if let Err(e) = protocol::configure_stream(&socket) {
                warn!("Could not tune socket for {}: {}", client_addr, e);
            }

            let shared = shared.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match handler::handle_connection(socket, &shared).await {
                    Ok(outcome) => debug!("Connection from {} finished: {:?}", client_addr, outcome),
                    Err(e) => warn!("Aborted connection from {}: {}", client_addr, e),
                }
            });
        }

        drop(listener);
        info!("Server shutting down, waiting for {} connection(s)", tasks.len());
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("Connection task failed: {}", e);
            }
        }

        shared.handle.mark_stopped();
        let summary = shared.aggregator.summarize().await;
        info!(
            "Server stopped after {} connection(s)",
            summary.total_connections()
        );
        Ok(summary)
    }
}
