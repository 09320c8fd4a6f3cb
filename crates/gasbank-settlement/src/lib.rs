mod poller;
mod resolver;

pub use poller::SettlementPoller;
pub use resolver::{Resolution, TimeoutResolver, WithdrawalResolver};
