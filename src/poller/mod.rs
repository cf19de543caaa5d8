//! Client-side payment poller.
//!
//! Drives one purchase from charge creation to a terminal state: it polls the
//! status endpoint on a fixed cadence, runs an independent countdown, and stops
//! every network call as soon as it reaches `Approved`, `Expired` or `Failed`.
//! On approval it asks for the seller's contact once before settling.

pub mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::services::{ChargeCreated, ContactReveal, StatusReport};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("payment service unreachable: {0}")]
    Transport(String),

    #[error("payment service answered {status}: {message}")]
    Api { status: u16, message: String },
}

/// The service endpoints the poller talks to.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(
        &self,
        buyer_id: &str,
        seller_id: &str,
    ) -> Result<ChargeCreated, GatewayError>;

    async fn check_status(&self, payment_id: &str) -> Result<StatusReport, GatewayError>;

    async fn reveal_contact(
        &self,
        payment_id: &str,
        seller_id: &str,
    ) -> Result<ContactReveal, GatewayError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollerState {
    Idle,
    Creating,
    Waiting {
        payment_id: String,
        charge: Option<ChargeCreated>,
    },
    /// `contact` is `None` when the reveal call failed; the payment stays approved.
    Approved {
        payment_id: String,
        contact: Option<ContactReveal>,
    },
    Expired {
        payment_id: String,
    },
    Failed {
        reason: String,
    },
}

impl PollerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollerState::Approved { .. } | PollerState::Expired { .. } | PollerState::Failed { .. }
        )
    }

    /// A fresh charge may be requested from here. It is never opened automatically.
    pub fn can_retry(&self) -> bool {
        matches!(self, PollerState::Expired { .. } | PollerState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            PollerState::Idle => "idle",
            PollerState::Creating => "creating",
            PollerState::Waiting { .. } => "waiting",
            PollerState::Approved { .. } => "approved",
            PollerState::Expired { .. } => "expired",
            PollerState::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failed checks tolerated. The next failure ends polling.
    pub failure_budget: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5 * 60),
            failure_budget: 3,
        }
    }
}

#[derive(Debug)]
enum Command {
    CheckNow,
    Cancel,
}

enum Start {
    NewCharge { buyer_id: String, seller_id: String },
    Existing { payment_id: String, seller_id: String },
}

pub struct Poller {
    gateway: Arc<dyn PaymentGateway>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: PollerConfig) -> Self {
        Self { gateway, config }
    }

    /// Opens a new charge and waits for it to settle.
    pub fn start(&self, buyer_id: &str, seller_id: &str) -> PollerHandle {
        self.spawn(Start::NewCharge {
            buyer_id: buyer_id.to_string(),
            seller_id: seller_id.to_string(),
        })
    }

    /// Waits on a charge that was already opened for `seller_id`.
    pub fn resume(&self, payment_id: &str, seller_id: &str) -> PollerHandle {
        self.spawn(Start::Existing {
            payment_id: payment_id.to_string(),
            seller_id: seller_id.to_string(),
        })
    }

    fn spawn(&self, start: Start) -> PollerHandle {
        let (state_tx, state_rx) = watch::channel(PollerState::Idle);
        let (command_tx, command_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(
            self.gateway.clone(),
            self.config.clone(),
            start,
            state_tx,
            command_rx,
        ));

        PollerHandle {
            commands: command_tx,
            state: state_rx,
            task,
        }
    }
}

/// Owner side of a running poller. Dropping it cancels polling.
pub struct PollerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PollerState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.clone()
    }

    /// "I already paid": checks immediately, outside the regular cadence.
    pub fn check_now(&self) {
        if let Err(e) = self.commands.try_send(Command::CheckNow) {
            tracing::debug!(error = %e, "check request dropped");
        }
    }

    pub async fn cancel(&self) {
        // A closed channel means the poller already stopped.
        let _ = self.commands.send(Command::Cancel).await;
    }

    pub async fn wait_terminal(&self) -> PollerState {
        let mut rx = self.state.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.is_terminal() {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

enum Step<T> {
    Done(T),
    Expired,
    Cancelled,
}

async fn run(
    gateway: Arc<dyn PaymentGateway>,
    config: PollerConfig,
    start: Start,
    state: watch::Sender<PollerState>,
    mut commands: mpsc::Receiver<Command>,
) {
    let (payment_id, seller_id, charge) = match start {
        Start::Existing {
            payment_id,
            seller_id,
        } => (payment_id, seller_id, None),
        Start::NewCharge {
            buyer_id,
            seller_id,
        } => {
            state.send_replace(PollerState::Creating);
            let result = {
                let create = gateway.create_charge(&buyer_id, &seller_id);
                tokio::pin!(create);
                loop {
                    tokio::select! {
                        result = &mut create => break Step::Done(result),
                        cmd = commands.recv() => match cmd {
                            Some(Command::CheckNow) => continue,
                            Some(Command::Cancel) | None => break Step::Cancelled,
                        },
                    }
                }
            };

            match result {
                Step::Done(Ok(charge)) => (charge.payment_id.clone(), seller_id, Some(charge)),
                Step::Done(Err(e)) => {
                    tracing::warn!(error = %e, "charge creation failed");
                    state.send_replace(PollerState::Failed {
                        reason: e.to_string(),
                    });
                    return;
                }
                Step::Expired | Step::Cancelled => {
                    state.send_replace(cancelled());
                    return;
                }
            }
        }
    };

    state.send_replace(PollerState::Waiting {
        payment_id: payment_id.clone(),
        charge,
    });

    let deadline = sleep(config.timeout);
    tokio::pin!(deadline);
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        let wake = tokio::select! {
            biased;
            _ = &mut deadline => Step::Expired,
            cmd = commands.recv() => match cmd {
                Some(Command::CheckNow) => Step::Done(()),
                Some(Command::Cancel) | None => Step::Cancelled,
            },
            _ = ticker.tick() => Step::Done(()),
        };
        match wake {
            Step::Done(()) => {}
            Step::Expired => return expire(&state, payment_id),
            Step::Cancelled => {
                state.send_replace(cancelled());
                return;
            }
        }

        let checked = {
            let check = gateway.check_status(&payment_id);
            tokio::pin!(check);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut deadline => break Step::Expired,
                    cmd = commands.recv() => match cmd {
                        // already checking
                        Some(Command::CheckNow) => continue,
                        Some(Command::Cancel) | None => break Step::Cancelled,
                    },
                    result = &mut check => break Step::Done(result),
                }
            }
        };

        match checked {
            Step::Done(Ok(report)) if report.approved => {
                tracing::info!(payment_id = %payment_id, "payment approved");
                let contact = match gateway.reveal_contact(&payment_id, &seller_id).await {
                    Ok(contact) => Some(contact),
                    Err(e) => {
                        tracing::warn!(payment_id = %payment_id, error = %e, "contact reveal failed");
                        None
                    }
                };
                state.send_replace(PollerState::Approved {
                    payment_id,
                    contact,
                });
                return;
            }
            Step::Done(Ok(report)) if report.status.is_terminal() => {
                tracing::info!(payment_id = %payment_id, status = %report.status, "payment closed without approval");
                state.send_replace(PollerState::Failed {
                    reason: report.message,
                });
                return;
            }
            Step::Done(Ok(report)) => {
                failures = 0;
                tracing::debug!(payment_id = %payment_id, status = %report.status, fallback = report.fallback, "still waiting");
            }
            Step::Done(Err(e)) => {
                failures += 1;
                tracing::warn!(payment_id = %payment_id, failures, error = %e, "status check failed");
                if failures > config.failure_budget {
                    state.send_replace(PollerState::Failed {
                        reason: format!("status checks kept failing: {e}"),
                    });
                    return;
                }
            }
            Step::Expired => return expire(&state, payment_id),
            Step::Cancelled => {
                state.send_replace(cancelled());
                return;
            }
        }
    }
}

fn expire(state: &watch::Sender<PollerState>, payment_id: String) {
    tracing::info!(payment_id = %payment_id, "payment window expired");
    state.send_replace(PollerState::Expired { payment_id });
}

fn cancelled() -> PollerState {
    PollerState::Failed {
        reason: "cancelled".to_string(),
    }
}
