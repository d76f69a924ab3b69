//! Connectivity smoke check against whatever database the environment names.
//!
//! `cargo run -p strata-state --example test_cloud` (reads `.env` if present)

use strata_state::storage_traits::SessionStore;
use strata_state::{ConnectTarget, SurrealHandle, SurrealLedgerStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let target = ConnectTarget::from_env();
    match &target {
        ConnectTarget::Cloud(cloud) => println!(
            "cloud {} ns={} db={} user={} root={}",
            cloud.endpoint,
            cloud.namespace,
            cloud.database,
            cloud.credentials.username(),
            cloud.credentials.is_root()
        ),
        other => println!("target {other:?}"),
    }

    let handle = SurrealHandle::connect(target).await?;
    let sessions = SurrealLedgerStore::new(&handle).list_sessions(None).await?;
    println!("connected, schema ready, {} session(s) visible", sessions.len());
    Ok(())
}
