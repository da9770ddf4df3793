//! Per-second sampling loop.
//!
//! Each tick polls link quality, draws one observation from each prober
//! channel with a bounded wait, and hands one merged record to the sink.
//! Transient failures skip the tick and are logged once per episode.
//!
//! Session phases: `Initializing` (one-time snapshot poll, done by the
//! caller), `Sampling`, `Draining` (sink flush), `Finished`.

use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use wlq_clock::Clock;
use wlq_fs::RecordSink;
use wlq_probe::{ExtractError, LinkStatusSource, QualityExtractor};
use wlq_schema::{
    AggregatedRecord, LatencyObservation, LinkStatusSnapshot, StopReason, ThroughputObservation,
};

use crate::config::SessionConfig;
use crate::logger::Logger;
use crate::signal::ShutdownCheck;
use crate::sleeper::Sleeper;
use crate::summary::{SessionResult, SessionTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Sampling,
    Draining,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Initializing => "initializing",
            Phase::Sampling => "sampling",
            Phase::Draining => "draining",
            Phase::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Why a tick produced no record.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    LinkDown,
    /// Quality text was missing a mandatory field or had a bad value.
    Extract(ExtractError),
    /// The quality poll itself failed.
    PollFailed(String),
    /// A prober produced nothing within the stall timeout.
    Stalled(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Recorded(Box<AggregatedRecord>),
    Skipped(SkipReason),
    /// A prober's channel closed; sampling cannot continue.
    ProducerGone(&'static str),
}

/// State threaded from one tick to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickState {
    pub totals: SessionTotals,
    pub ticks_attempted: u64,
    /// Set while link polls keep failing (down, incomplete or erroring).
    pub link_episode: bool,
    /// Set while prober reads keep timing out.
    pub stall_episode: bool,
    pub consecutive_stalls: u32,
}

/// Prober channels the loop reads from.
pub struct ProberStreams<'a> {
    pub latency: &'a Receiver<LatencyObservation>,
    /// `None` when throughput is disabled; records then carry 0.0.
    pub throughput: Option<&'a Receiver<ThroughputObservation>>,
}

enum Draw<T> {
    Got(T),
    Stalled,
    Gone,
}

fn draw<T>(rx: &Receiver<T>, timeout: Duration) -> Draw<T> {
    match rx.recv_timeout(timeout) {
        Ok(value) => Draw::Got(value),
        Err(RecvTimeoutError::Timeout) => Draw::Stalled,
        Err(RecvTimeoutError::Disconnected) => Draw::Gone,
    }
}

/// Drives the sampling and draining phases of one session.
pub struct Sampler<'a, L, S, C, Z, D, G>
where
    L: LinkStatusSource + ?Sized,
    S: RecordSink + ?Sized,
    C: Clock + ?Sized,
    Z: Sleeper + ?Sized,
    D: ShutdownCheck + ?Sized,
    G: Logger + ?Sized,
{
    pub link: &'a L,
    pub sink: &'a S,
    pub clock: &'a C,
    pub sleeper: &'a Z,
    pub shutdown: &'a D,
    pub logger: &'a G,
    pub extractor: &'a QualityExtractor,
    pub snapshot: &'a LinkStatusSnapshot,
    pub config: &'a SessionConfig,
}

impl<'a, L, S, C, Z, D, G> Sampler<'a, L, S, C, Z, D, G>
where
    L: LinkStatusSource + ?Sized,
    S: RecordSink + ?Sized,
    C: Clock + ?Sized,
    Z: Sleeper + ?Sized,
    D: ShutdownCheck + ?Sized,
    G: Logger + ?Sized,
{
    fn enter(&self, phase: Phase) {
        self.logger.debug(&format!("phase: {}", phase));
    }

    fn link_failure(&self, mut state: TickState, message: String, reason: SkipReason) -> (TickState, TickOutcome) {
        if !state.link_episode {
            self.logger.info(&message);
            state.link_episode = true;
        }
        (state, TickOutcome::Skipped(reason))
    }

    fn stalled(&self, mut state: TickState, tick: u64, prober: &'static str) -> (TickState, TickOutcome) {
        if !state.stall_episode {
            self.logger.info(&format!(
                "{} prober stalled (no reading within {}ms at tick {})",
                prober,
                self.config.stall_timeout.as_millis(),
                tick
            ));
            state.stall_episode = true;
        }
        state.consecutive_stalls += 1;
        (state, TickOutcome::Skipped(SkipReason::Stalled(prober)))
    }

    /// Run one tick.
    pub fn tick(&self, mut state: TickState, tick: u64, streams: &ProberStreams<'_>) -> (TickState, TickOutcome) {
        state.ticks_attempted += 1;

        let text = match self.link.quality() {
            Ok(text) => text,
            Err(e) => {
                let message = format!("link poll failed: {}", e);
                return self.link_failure(state, message, SkipReason::PollFailed(e.to_string()));
            }
        };

        let sample = match self.extractor.extract(&text, self.snapshot.band) {
            Ok(sample) => sample,
            Err(ExtractError::LinkDown) => {
                let message = format!("link lost at tick {}", tick);
                return self.link_failure(state, message, SkipReason::LinkDown);
            }
            Err(e) => {
                let message = format!("link status incomplete at tick {}: {}", tick, e);
                return self.link_failure(state, message, SkipReason::Extract(e));
            }
        };

        let latency = match draw(streams.latency, self.config.stall_timeout) {
            Draw::Got(obs) => obs,
            Draw::Stalled => return self.stalled(state, tick, "latency"),
            Draw::Gone => return (state, TickOutcome::ProducerGone("latency")),
        };

        let throughput_mbps = match streams.throughput {
            Some(rx) => match draw(rx, self.config.stall_timeout) {
                Draw::Got(obs) => obs.mbps,
                Draw::Stalled => return self.stalled(state, tick, "throughput"),
                Draw::Gone => return (state, TickOutcome::ProducerGone("throughput")),
            },
            None => 0.0,
        };

        if state.link_episode {
            self.logger.info(&format!("link restored at tick {}", tick));
        }
        state.link_episode = false;
        state.stall_episode = false;
        state.consecutive_stalls = 0;

        let record = AggregatedRecord::assemble(
            self.clock.now_unix_ms(),
            tick,
            &self.config.location,
            self.config.direction,
            self.snapshot,
            &sample,
            &latency,
            throughput_mbps,
        );
        state.totals.add(&record);

        self.logger.verbose(&format!(
            "tick {}: signal {} dBm, rx {} Mbit/s, tx {} Mbit/s, mcs {}/{}, nss {}, latency {} ms, throughput {} Mbit/s",
            tick,
            record.signal_dbm,
            record.rx_bitrate_mbps,
            record.tx_bitrate_mbps,
            record.rx_mcs,
            record.tx_mcs,
            record.nss,
            record.latency_ms,
            record.throughput_mbps
        ));

        if let Err(e) = self.sink.append(record.clone()) {
            self.logger.info(&format!("sink: {}", e));
        }

        (state, TickOutcome::Recorded(Box::new(record)))
    }

    /// Tick until the duration is reached, a prober exits, the stall limit
    /// is hit or shutdown is requested.
    pub fn run(&self, streams: &ProberStreams<'_>) -> SessionResult {
        self.enter(Phase::Sampling);
        let started_at_unix_sec = self.clock.now_unix_sec();
        let bounded = self.config.duration_sec > 0;

        let mut state = TickState::default();
        let mut tick = 0;

        let stop_reason = loop {
            if bounded && tick >= self.config.duration_sec {
                break StopReason::Completed;
            }
            if self.shutdown.should_stop() {
                self.logger.info("interrupted, stopping sampling");
                break StopReason::Interrupted;
            }

            tick += 1;
            let tick_started_ms = self.clock.now_unix_ms();
            let (next, outcome) = self.tick(state, tick, streams);
            state = next;

            if let TickOutcome::ProducerGone(prober) = outcome {
                // An interrupt also kills the probers; report it as such.
                if self.shutdown.should_stop() {
                    self.logger.info("interrupted, stopping sampling");
                    break StopReason::Interrupted;
                }
                self.logger.info(&format!("{} prober exited, stopping sampling", prober));
                break StopReason::ProducerExited;
            }

            if let Some(limit) = self.config.max_consecutive_stalls {
                if state.consecutive_stalls >= limit {
                    self.logger.info(&format!(
                        "{} consecutive stalled ticks, stopping sampling",
                        state.consecutive_stalls
                    ));
                    break StopReason::StallLimit;
                }
            }

            if bounded && tick >= self.config.duration_sec {
                continue;
            }
            let elapsed = Duration::from_millis(self.clock.now_unix_ms().saturating_sub(tick_started_ms));
            let remaining = self.config.tick.saturating_sub(elapsed);
            if !remaining.is_zero() {
                self.sleeper.sleep(remaining);
            }
        };

        SessionResult {
            totals: state.totals,
            ticks_attempted: state.ticks_attempted,
            stop_reason,
            started_at_unix_sec,
            finished_at_unix_sec: self.clock.now_unix_sec(),
        }
    }

    /// Flush what is buffered, then wait (bounded) for in-flight writes.
    pub fn drain(&self) {
        self.enter(Phase::Draining);

        let flush_started_ms = self.clock.now_unix_ms();
        match self.sink.flush() {
            Ok(written) => self.logger.debug(&format!("sink: flushed {} buffered records", written)),
            Err(e) => self.logger.info(&format!("sink: {}", e)),
        }
        let flush_took = Duration::from_millis(
            self.clock.now_unix_ms().saturating_sub(flush_started_ms),
        );

        // The flush and the countdown share one max_flush_wait budget.
        let mut countdown = self
            .sink
            .max_flush_wait()
            .saturating_sub(flush_took)
            .as_secs();
        while self.sink.flush_in_progress() && countdown > 0 {
            self.logger
                .info(&format!("waiting for sink flush ... {}s left", countdown));
            self.sleeper.sleep_sec(1);
            countdown -= 1;
        }
        if self.sink.flush_in_progress() {
            self.logger.info("sink flush still running, not waiting any longer");
        }

        let stats = self.sink.stats();
        self.logger.debug(&format!(
            "sink: {} records written, {} dropped",
            stats.written, stats.dropped
        ));
        self.enter(Phase::Finished);
    }
}
