use gasbank_api::{create_app, AppState};
use gasbank_settlement::{SettlementPoller, TimeoutResolver};
use gasbank_store::{GasBankStore, MemoryStore, SledStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Persistent store when GASBANK_DATA is set, in-memory otherwise
    let store: Arc<dyn GasBankStore> = match std::env::var("GASBANK_DATA") {
        Ok(path) => Arc::new(SledStore::open(&path).expect("open sled store")),
        Err(_) => Arc::new(MemoryStore::new()),
    };
    let state = AppState::with_store(store);

    // Background settlement of pending withdrawals
    let resolver = Arc::new(TimeoutResolver::new(Duration::from_secs(5 * 60)));
    let poller = Arc::new(SettlementPoller::new(state.service.clone(), resolver));
    poller.start();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .expect("bind listener");

    tracing::info!("gasbank API server running on http://127.0.0.1:3000");

    axum::serve(listener, app).await.expect("serve");
}
