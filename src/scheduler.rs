use crate::config::QueryConfig;
use crate::fetcher::LogSource;
use crate::log_entry::LogEntry;
use crate::tail_engine::TailEngine;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Absorbing,
    Emitting,
    Sleeping,
    Stopped,
}

/// Counters describing a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub emitted: u64,
}

/// Drives fetch, de-duplication and emission on a fixed cadence.
///
/// One cycle completes before the next one starts. The engine is owned by
/// the scheduler and handed back when the run ends.
pub struct Scheduler<S> {
    source: S,
    engine: TailEngine,
    query: QueryConfig,
    state: PollState,
    stats: PollStats,
}

impl<S: LogSource> Scheduler<S> {
    pub fn new(source: S, query: QueryConfig) -> Self {
        let engine = TailEngine::new(query.max_lines);
        Self::with_engine(source, engine, query)
    }

    pub fn with_engine(source: S, engine: TailEngine, query: QueryConfig) -> Self {
        Self {
            source,
            engine,
            query,
            state: PollState::Idle,
            stats: PollStats::default(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll until `cancel` fires, the receiving side of `sink` is dropped, or
    /// the source reports a fatal error. Other fetch errors count as an empty
    /// batch for that cycle.
    ///
    /// A fetch that completes after cancellation is discarded without being
    /// absorbed.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        sink: mpsc::UnboundedSender<LogEntry>,
    ) -> (TailEngine, PollStats) {
        info!(
            "Polling every {:?} (level={}, sort={})",
            self.query.poll_interval,
            self.query.level_set(),
            self.query.sort_order
        );

        while !cancel.is_cancelled() {
            self.transition(PollState::Fetching);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.source.fetch(&self.query) => outcome,
            };
            if cancel.is_cancelled() {
                debug!("Discarding batch fetched after cancellation");
                break;
            }
            self.stats.cycles += 1;

            let batch = match outcome {
                Ok(batch) => batch,
                Err(e) if e.is_fatal() => {
                    error!("Stopping: {}", e);
                    self.stats.failed_cycles += 1;
                    break;
                }
                Err(e) => {
                    error!("Fetch failed: {}", e);
                    self.stats.failed_cycles += 1;
                    Vec::new()
                }
            };

            self.transition(PollState::Absorbing);
            let received = batch.len();
            let mut emitted = 0u64;
            let mut sink_closed = false;

            self.transition(PollState::Emitting);
            for entry in self.engine.absorb(batch) {
                if sink.send(entry).is_err() {
                    sink_closed = true;
                    break;
                }
                emitted += 1;
            }
            self.stats.emitted += emitted;
            debug!("Cycle {}: {} received, {} new", self.stats.cycles, received, emitted);

            if sink_closed {
                info!("Output closed, stopping");
                break;
            }

            self.transition(PollState::Sleeping);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.query.poll_interval) => {}
            }
        }

        self.transition(PollState::Stopped);
        (self.engine, self.stats)
    }

    fn transition(&mut self, next: PollState) {
        debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
