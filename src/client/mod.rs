use crate::action::{MAX_CODE, MIN_CODE};
use crate::config::ClientConfig;
use anyhow::{Result, bail};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};

mod handler;

pub use handler::{Exchange, connect, exchange, render};

pub const MAX_CONNECTIONS: usize = 60;

/// Opens batches of concurrent connections against one server.
pub struct Launcher {
    config: Arc<ClientConfig>,
}

/// What one batch of connections produced, gathered after every connection
/// task has finished.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub requested: usize,
    pub goodbyes: usize,
    pub failed: usize,
    pub latencies: Vec<Duration>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.latencies.len()
    }

    pub fn min(&self) -> Option<Duration> {
        self.latencies.iter().min().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.latencies.iter().max().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.latencies.len()).ok().filter(|n| *n > 0)?;
        Some(self.latencies.iter().sum::<Duration>() / n)
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} request(s) answered, {} failed",
            self.succeeded(),
            self.requested,
            self.failed
        )?;
        if let (Some(min), Some(mean), Some(max)) = (self.min(), self.mean(), self.max()) {
            write!(
                f,
                " (min {}ms / avg {}ms / max {}ms)",
                min.as_millis(),
                mean.as_millis(),
                max.as_millis()
            )?;
        }
        Ok(())
    }
}

impl Launcher {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn server_addr(&self) -> &str {
        &self.config.server_addr
    }

    /// Opens `num_connections` connections at once, each sending `code`, and
    /// returns when all of them have finished.
    pub async fn launch(&self, num_connections: usize, code: u8) -> Result<BatchReport> {
        if !(1..=MAX_CONNECTIONS).contains(&num_connections) {
            bail!(
                "number of connections must be between 1 and {}, got {}",
                MAX_CONNECTIONS,
                num_connections
            );
        }
        if !(MIN_CODE..=MAX_CODE).contains(&code) {
            bail!("action must be between {} and {}, got {}", MIN_CODE, MAX_CODE, code);
        }

        println!(
            "Connecting to [{}] with {} client(s).",
            self.config.server_addr, num_connections
        );

        let mut tasks = JoinSet::new();
        for _ in 0..num_connections {
            let config = self.config.clone();
            tasks.spawn(async move { handler::run(&config.server_addr, code, &config).await });
        }

        let mut report = BatchReport {
            requested: num_connections,
            ..BatchReport::default()
        };
        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(Ok(Exchange::Reply { elapsed, .. })) => report.latencies.push(elapsed),
                Ok(Ok(Exchange::Goodbye)) => report.goodbyes += 1,
                Ok(Err(e)) => {
                    error!("Connection failed: {}", e);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Connection task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!("Batch finished: {}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_no_statistics() {
        let report = BatchReport {
            requested: 3,
            failed: 3,
            ..BatchReport::default()
        };
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.mean(), None);
        assert_eq!(report.to_string(), "0 of 3 request(s) answered, 3 failed");
    }

    #[test]
    fn report_statistics() {
        let report = BatchReport {
            requested: 3,
            latencies: [4, 8, 12].map(Duration::from_millis).to_vec(),
            ..BatchReport::default()
        };
        assert_eq!(report.min(), Some(Duration::from_millis(4)));
        assert_eq!(report.max(), Some(Duration::from_millis(12)));
        assert_eq!(report.mean(), Some(Duration::from_millis(8)));
        assert!(report.to_string().ends_with("(min 4ms / avg 8ms / max 12ms)"));
    }

    #[tokio::test]
    async fn batch_size_is_bounded() {
        let launcher = Launcher::new(ClientConfig::default());
        assert!(launcher.launch(0, 1).await.is_err());
        assert!(launcher.launch(61, 1).await.is_err());
    }

    #[tokio::test]
    async fn action_code_is_checked_before_connecting() {
        let launcher = Launcher::new(ClientConfig::default());
        assert!(launcher.launch(1, 0).await.is_err());
        assert!(launcher.launch(1, 8).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_fails_each_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let launcher = Launcher::new(ClientConfig {
            server_addr: addr,
            ..ClientConfig::default()
        });
        let report = launcher.launch(4, 1).await.unwrap();
        assert_eq!(report.requested, 4);
        assert_eq!(report.failed, 4);
        assert_eq!(report.succeeded(), 0);
    }
}
