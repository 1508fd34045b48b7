use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Exchanges that got their command started.
    pub dispatched: u64,
    /// Exchanges whose reply was fully sent.
    pub total_connections: u64,
    pub total_processing_time: Duration,
    pub total_roundtrip_time: Duration,
}

/// Cross-connection latency accumulator.
///
/// The two increments a connection performs are locked independently, so a
/// reader racing with an in-flight connection can see one without the other.
/// `summarize` is only meaningful once the server has stopped.
#[derive(Debug, Default)]
pub struct Aggregator {
    totals: Mutex<Totals>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_processing_time(&self, elapsed: Duration) {
        let mut totals = self.totals.lock().await;
        totals.dispatched += 1;
        totals.total_processing_time += elapsed;
        debug!("Processing time {}ms", elapsed.as_millis());
    }

    /// Counts one completed connection and its round-trip time.
    pub async fn add_roundtrip_time(&self, elapsed: Duration) {
        let mut totals = self.totals.lock().await;
        totals.total_connections += 1;
        totals.total_roundtrip_time += elapsed;
        debug!(
            "Round trip {}ms (connections so far: {})",
            elapsed.as_millis(),
            totals.total_connections
        );
    }

    pub async fn snapshot(&self) -> Totals {
        *self.totals.lock().await
    }

    pub async fn summarize(&self) -> Summary {
        Summary::from(self.snapshot().await)
    }
}

pub type SharedAggregator = Arc<Aggregator>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summary {
    NoConnections,
    Report {
        total_connections: u64,
        /// Dispatched but never answered, e.g. the command died mid-drain.
        aborted: u64,
        avg_processing: Duration,
        avg_roundtrip: Duration,
    },
}

impl Summary {
    pub fn total_connections(&self) -> u64 {
        match self {
            Summary::NoConnections => 0,
            Summary::Report {
                total_connections, ..
            } => *total_connections,
        }
    }
}

fn average(total: Duration, count: u64) -> Duration {
    // Duration only divides by u32
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(n) => total / n,
        Err(_) => total.div_f64(count as f64),
    }
}

impl From<Totals> for Summary {
    fn from(totals: Totals) -> Self {
        if totals.total_connections == 0 {
            return Summary::NoConnections;
        }
        Summary::Report {
            total_connections: totals.total_connections,
            aborted: totals.dispatched.saturating_sub(totals.total_connections),
            avg_processing: average(totals.total_processing_time, totals.dispatched),
            avg_roundtrip: average(totals.total_roundtrip_time, totals.total_connections),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n\nServer Running Information")?;
        writeln!(f, "==========================")?;
        match self {
            Summary::NoConnections => {
                writeln!(f, "Total Connections: 0")?;
                writeln!(f, "No connections completed; no timing data.")?;
            }
            Summary::Report {
                total_connections,
                aborted,
                avg_processing,
                avg_roundtrip,
            } => {
                writeln!(f, "Total Connections: {}", total_connections)?;
                if *aborted > 0 {
                    writeln!(f, "Aborted Connections: {}", aborted)?;
                }
                writeln!(
                    f,
                    "Total Average Message Response Time: {}ms",
                    avg_processing.as_millis()
                )?;
                writeln!(
                    f,
                    "Total Round Trip Message Response Time: {}ms",
                    avg_roundtrip.as_millis()
                )?;
            }
        }
        write!(f, "Goodbye!")
    }
}
