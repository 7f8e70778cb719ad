//! Discovery state machine.
//!
//! ```text
//! Searching ──found──────────────▶ Found
//!     │
//!     └─budget spent──▶ ExhaustedFallback ──bound──▶ FallbackFound
//!                              │
//!                              └─rounds spent──▶ GiveUp
//! ```
//!
//! Each [`DiscoveryEngine::step`] performs one attempt and returns the delay
//! before the next one, so the policy is testable without real time passing.
//! Fallback rounds that run beside the primary search (midway through the
//! budget, and after a primary hit) are spawned as separate workers.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use super::fallback::run_fallback;
use super::schedule::Scheduler;
use super::{CallSiteSink, DiscoveryPolicy, primary_candidates};
use crate::boundary::contain;
use crate::error::DiscoveryFailure;
use crate::host::TypeRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Primary search; `attempt` is 1-based.
    Searching { attempt: u32 },
    /// A primary call site is bound.
    Found,
    /// Primary budget spent; running fallback rounds. Round 0 is the
    /// immediate one, later rounds follow the background retry delays.
    ExhaustedFallback { round: usize },
    /// Fallback bound at least one setter after the primary search failed.
    FallbackFound,
    /// Nothing could be bound. Discovery does not restart.
    GiveUp,
}

impl DiscoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscoveryState::Found | DiscoveryState::FallbackFound | DiscoveryState::GiveUp
        )
    }
}

/// Progress reported to the frame thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Transition(DiscoveryState),
    /// A fallback round bound `count` setters.
    FallbackBound { count: usize },
    GaveUp(DiscoveryFailure),
}

type Events = Option<Sender<DiscoveryEvent>>;

fn emit(events: &Events, event: DiscoveryEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

pub struct DiscoveryEngine<R: ?Sized, S: ?Sized> {
    registry: Arc<R>,
    sink: Arc<S>,
    policy: DiscoveryPolicy,
    scheduler: Arc<dyn Scheduler>,
    events: Events,
    state: DiscoveryState,
    fallback_rounds: u32,
}

impl<R, S> DiscoveryEngine<R, S>
where
    R: TypeRegistry + ?Sized + 'static,
    S: CallSiteSink + ?Sized + 'static,
{
    pub fn new(
        registry: Arc<R>,
        sink: Arc<S>,
        policy: DiscoveryPolicy,
        scheduler: Arc<dyn Scheduler>,
        events: Option<Sender<DiscoveryEvent>>,
    ) -> Self {
        Self {
            registry,
            sink,
            policy,
            scheduler,
            events,
            state: DiscoveryState::Searching { attempt: 1 },
            fallback_rounds: 0,
        }
    }

    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    /// Fallback rounds run by this engine itself, excluding spawned workers.
    pub fn fallback_rounds(&self) -> u32 {
        self.fallback_rounds
    }

    /// Runs to a terminal state, sleeping through the scheduler.
    pub fn run(mut self) -> DiscoveryState {
        self.run_in_place();
        self.state
    }

    fn run_in_place(&mut self) {
        while let Some(delay) = self.step() {
            self.scheduler.sleep(delay);
        }
    }

    /// Ends discovery after an unexpected fault in the worker.
    fn abandon(&mut self) {
        let attempts = match self.state {
            DiscoveryState::Searching { attempt } => attempt,
            _ => self.policy.max_attempts,
        };
        let failure = DiscoveryFailure {
            attempts,
            fallback_rounds: self.fallback_rounds,
        };
        warn!("Discovery aborted: {}", failure);
        self.transition(DiscoveryState::GiveUp);
        emit(&self.events, DiscoveryEvent::GaveUp(failure));
    }

    /// Performs one attempt. Returns the delay before the next step, or
    /// `None` once a terminal state is reached.
    pub fn step(&mut self) -> Option<Duration> {
        match self.state.clone() {
            DiscoveryState::Searching { attempt } => self.search(attempt),
            DiscoveryState::ExhaustedFallback { round } => self.exhausted_round(round),
            DiscoveryState::Found | DiscoveryState::FallbackFound | DiscoveryState::GiveUp => None,
        }
    }

    fn transition(&mut self, next: DiscoveryState) {
        debug!("Discovery {:?} -> {:?}", self.state, next);
        self.state = next.clone();
        emit(&self.events, DiscoveryEvent::Transition(next));
    }

    fn search(&mut self, attempt: u32) -> Option<Duration> {
        info!("Searching for text accessor, attempt {}/{}", attempt, self.policy.max_attempts);

        if self.try_primary() {
            self.transition(DiscoveryState::Found);
            // The string table may be bypassed by some UI paths.
            self.spawn_fallback("textswap-fallback-after-found", vec![Duration::ZERO]);
            return None;
        }

        if attempt == self.policy.early_fallback_attempt {
            self.fallback_rounds += 1;
            let outcome = run_fallback(self.registry.as_ref(), self.sink.as_ref(), &self.policy);
            if outcome.found() {
                info!("Early fallback bound {} UI setters", outcome.bound);
                emit(&self.events, DiscoveryEvent::FallbackBound { count: outcome.bound });
            } else {
                self.spawn_fallback(
                    "textswap-fallback-retry",
                    self.policy.background_retry_delays.clone(),
                );
            }
        }

        if attempt >= self.policy.max_attempts {
            warn!(
                "Text accessor not found after {} attempts, trying UI setters",
                self.policy.max_attempts
            );
            self.transition(DiscoveryState::ExhaustedFallback { round: 0 });
        } else {
            self.transition(DiscoveryState::Searching { attempt: attempt + 1 });
        }
        Some(self.policy.attempt_delay)
    }

    /// Offers ranked candidates until one binds.
    fn try_primary(&self) -> bool {
        for site in primary_candidates(self.registry.as_ref(), &self.policy) {
            let label = site.to_string();
            if self.sink.offer(site) {
                info!("Primary text accessor bound: {}", label);
                return true;
            }
            debug!("Candidate {} rejected, trying next", label);
        }
        false
    }

    fn exhausted_round(&mut self, round: usize) -> Option<Duration> {
        self.fallback_rounds += 1;
        let outcome = run_fallback(self.registry.as_ref(), self.sink.as_ref(), &self.policy);
        if outcome.found() {
            info!("Fallback bound {} UI setters (round {})", outcome.bound, round);
            emit(&self.events, DiscoveryEvent::FallbackBound { count: outcome.bound });
            self.transition(DiscoveryState::FallbackFound);
            return None;
        }

        match self.policy.background_retry_delays.get(round).copied() {
            Some(delay) => {
                debug!("Fallback round {} found nothing, retrying in {:?}", round, delay);
                self.transition(DiscoveryState::ExhaustedFallback { round: round + 1 });
                Some(delay)
            }
            None => {
                let failure = DiscoveryFailure {
                    attempts: self.policy.max_attempts,
                    fallback_rounds: self.fallback_rounds,
                };
                warn!("{}; relying on the periodic rescanner", failure);
                self.transition(DiscoveryState::GiveUp);
                emit(&self.events, DiscoveryEvent::GaveUp(failure));
                None
            }
        }
    }

    fn spawn_fallback(&self, name: &str, delays: Vec<Duration>) {
        let registry = self.registry.clone();
        let sink = self.sink.clone();
        let policy = self.policy.clone();
        let scheduler = self.scheduler.clone();
        let events = self.events.clone();

        self.scheduler.spawn(
            name,
            Box::new(move || {
                let _ = contain("background fallback", || {
                    for delay in delays {
                        scheduler.sleep(delay);
                        let outcome = run_fallback(registry.as_ref(), sink.as_ref(), &policy);
                        if outcome.found() {
                            info!("Background fallback bound {} UI setters", outcome.bound);
                            emit(&events, DiscoveryEvent::FallbackBound { count: outcome.bound });
                            return;
                        }
                    }
                    debug!("Background fallback retries found no UI setters");
                });
            }),
        );
    }
}

/// Starts discovery on a background worker.
pub fn spawn_discovery<R, S>(
    registry: Arc<R>,
    sink: Arc<S>,
    policy: DiscoveryPolicy,
    scheduler: Arc<dyn Scheduler>,
    events: Option<Sender<DiscoveryEvent>>,
) where
    R: TypeRegistry + ?Sized + 'static,
    S: CallSiteSink + ?Sized + 'static,
{
    let mut engine = DiscoveryEngine::new(registry, sink, policy, scheduler.clone(), events);
    scheduler.spawn(
        "textswap-discovery",
        Box::new(move || {
            if contain("discovery", || engine.run_in_place()).is_none() {
                engine.abandon();
            }
            debug!("Discovery finished in state {:?}", engine.state);
        }),
    );
}
