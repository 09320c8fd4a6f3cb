use gasbank_types::{Result, Transaction};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of polling the settlement layer for one withdrawal.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Whether the withdrawal has reached a final on-chain outcome.
    pub done: bool,
    /// Only meaningful when `done`.
    pub success: bool,
    pub message: String,
    /// Suggested backoff before the next poll when not yet settled.
    pub retry_after: Option<Duration>,
}

impl Resolution {
    pub fn settled(success: bool, message: impl Into<String>) -> Self {
        Resolution {
            done: true,
            success,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn retry(retry_after: Duration) -> Self {
        Resolution {
            done: false,
            success: false,
            message: String::new(),
            retry_after: Some(retry_after),
        }
    }
}

/// Decides whether an in-flight withdrawal has settled on-chain.
pub trait WithdrawalResolver: Send + Sync {
    fn resolve(&self, tx: &Transaction) -> Result<Resolution>;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Marks pending withdrawals as failed once a timeout has elapsed without
/// confirmation. A stand-in for a real chain watcher.
pub struct TimeoutResolver {
    timeout: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl TimeoutResolver {
    pub fn new(timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        TimeoutResolver {
            timeout,
            seen: Mutex::new(HashMap::new()),
        }
    }
}

impl WithdrawalResolver for TimeoutResolver {
    fn resolve(&self, tx: &Transaction) -> Result<Resolution> {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        match seen.get(&tx.id) {
            Some(first_seen) if first_seen.elapsed() >= self.timeout => {
                seen.remove(&tx.id);
                Ok(Resolution::settled(
                    false,
                    "timeout waiting for blockchain confirmation",
                ))
            }
            Some(_) => Ok(Resolution::retry(self.timeout / 4)),
            None => {
                seen.insert(tx.id.clone(), Instant::now());
                Ok(Resolution::retry(self.timeout / 4))
            }
        }
    }
}
