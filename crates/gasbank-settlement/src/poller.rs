use chrono::Utc;
use gasbank_core::GasBankService;
use gasbank_store::GasBankStore;
use gasbank_types::{AttemptStatus, GasBankError, SettlementAttempt, Transaction, TxStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const SCHEDULE_ACTIVATION_BATCH: usize = 100;

/// Watches pending withdrawals and settles them through the resolver.
///
/// Each pass activates due schedules, polls the resolver for every pending
/// withdrawal whose backoff has elapsed, records a settlement attempt, and
/// either completes the withdrawal or dead-letters it once the attempt
/// budget is spent.
pub struct SettlementPoller {
    service: Arc<GasBankService>,
    resolver: Arc<dyn crate::WithdrawalResolver>,
    interval: Duration,
    max_attempts: u32,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SettlementPoller {
    pub fn new(service: Arc<GasBankService>, resolver: Arc<dyn crate::WithdrawalResolver>) -> Self {
        SettlementPoller {
            service,
            resolver,
            interval: DEFAULT_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Override the retry cadence and attempt budget.
    pub fn with_retry_policy(mut self, max_attempts: u32, interval: Duration) -> Self {
        if max_attempts > 0 {
            self.max_attempts = max_attempts;
        }
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Spawn the background polling loop. Idempotent while running.
    pub fn start(self: &Arc<Self>) {
        let mut shutdown = self.shutdown.lock().unwrap_or_else(|e| e.into_inner());
        if shutdown.is_some() {
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *shutdown = Some(tx);

        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first interval tick fires immediately; skip it so the loop
            // cadence matches the configured interval.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => poller.run_once(),
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        info!("gas bank settlement poller started");
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(&self) {
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Run one settlement pass now.
    pub fn run_once(&self) {
        if let Err(e) = self.service.activate_due_schedules(SCHEDULE_ACTIVATION_BATCH) {
            warn!(error = %e, "activate due schedules failed");
        }

        let pending = match self.service.store().list_pending_withdrawals() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "list pending withdrawals failed");
                return;
            }
        };

        let now = Utc::now();
        for tx in pending {
            if tx.next_attempt_at.is_some_and(|at| at > now) {
                continue;
            }
            self.attempt_settlement(tx);
        }
    }

    fn attempt_settlement(&self, tx: Transaction) {
        let started = Utc::now();
        let resolution = self.resolver.resolve(&tx);
        let completed = Utc::now();

        let (status, message, retry_after) = match &resolution {
            Err(e) => (AttemptStatus::Error, e.to_string(), None),
            Ok(res) if !res.done => (AttemptStatus::Retry, res.message.clone(), res.retry_after),
            Ok(res) if res.success => (AttemptStatus::Succeeded, res.message.clone(), None),
            Ok(res) => (AttemptStatus::Failed, res.message.clone(), None),
        };

        let tx = match self.record_attempt(&tx, status, &message, started, completed, retry_after)
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(transaction_id = %tx.id, error = %e, "record settlement attempt failed");
                tx
            }
        };

        match resolution {
            Err(e) => {
                warn!(transaction_id = %tx.id, error = %e, "withdrawal resolver error");
                self.maybe_dead_letter(&tx, "resolver error", &message);
            }
            Ok(res) if !res.done => {
                self.maybe_dead_letter(&tx, "max attempts exceeded", &message);
            }
            Ok(res) => {
                match self
                    .service
                    .complete_withdrawal(&tx.id, res.success, &res.message)
                {
                    Ok((account, settled)) => {
                        info!(
                            transaction_id = %settled.id,
                            gas_account_id = %account.id,
                            success = res.success,
                            "settlement poller completed withdrawal"
                        );
                    }
                    Err(GasBankError::InvalidStatus { .. }) => {
                        // Settled concurrently; nothing left to do.
                    }
                    Err(e) => {
                        warn!(transaction_id = %tx.id, error = %e, "complete withdrawal failed");
                    }
                }
            }
        }
    }

    /// Persist the attempt record and the resolver bookkeeping on the
    /// transaction row. A lost version race is reported, not retried; the
    /// next pass re-reads the row.
    fn record_attempt(
        &self,
        tx: &Transaction,
        status: AttemptStatus,
        message: &str,
        started: chrono::DateTime<Utc>,
        completed: chrono::DateTime<Utc>,
        retry_after: Option<Duration>,
    ) -> gasbank_types::Result<Transaction> {
        let store = self.service.store();
        let attempt = tx.resolver_attempts + 1;
        if let Err(e) = store.record_settlement_attempt(SettlementAttempt {
            transaction_id: tx.id.clone(),
            attempt,
            started_at: started,
            completed_at: completed,
            status,
            message: (!message.is_empty()).then(|| message.to_string()),
        }) {
            warn!(transaction_id = %tx.id, error = %e, "settlement attempt record failed");
        }

        let mut updated = store.get_transaction(&tx.id)?;
        if updated.status != TxStatus::Pending {
            return Ok(updated);
        }
        updated.resolver_attempts = attempt;
        updated.resolver_error = (!message.is_empty()).then(|| message.to_string());
        updated.last_attempt_at = Some(completed);
        updated.next_attempt_at = match status {
            AttemptStatus::Succeeded | AttemptStatus::Failed => None,
            _ => retry_after
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .map(|d| completed + d),
        };
        store.update_transaction(updated)
    }

    fn maybe_dead_letter(&self, tx: &Transaction, reason: &str, message: &str) {
        if self.max_attempts == 0 || tx.resolver_attempts < self.max_attempts {
            return;
        }
        if tx.status != TxStatus::Pending {
            return;
        }
        let last_error = (!message.is_empty()).then(|| message.to_string());
        if let Err(e) = self.service.mark_dead_letter(&tx.id, reason, last_error) {
            warn!(transaction_id = %tx.id, error = %e, "failed to mark dead letter");
        }
    }
}
