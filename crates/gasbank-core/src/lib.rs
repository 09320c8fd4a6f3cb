mod service;
mod summary;

pub use service::{
    EnsureAccountOptions, GasBankService, WithdrawOptions, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
};
pub use summary::{AccountSummary, Summary, TransactionBrief};

#[cfg(test)]
mod tests;
