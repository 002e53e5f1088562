//! Expiry sweeper
//!
//! Background pass that evicts bindings whose cooldown has elapsed. The
//! gate already treats expired records as absent (and lazily erases them),
//! so this is pure cleanup; erase is idempotent, which makes the sweep safe
//! to interleave with in-flight logins.

use std::sync::Arc;
use std::time::Duration;

use crate::gate::LimitState;
use crate::store::{BindingStore, StoreError};

/// How often the sweep runs.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Periodic sweep loop. Spawn this once next to the gate.
pub async fn run(state: Arc<LimitState>) {
    let mut ticker = tokio::time::interval(SWEEP_PERIOD);
    loop {
        ticker.tick().await;
        match sweep_once(&state).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("[sweep] removed {} expired bindings", n),
            Err(e) => tracing::error!("[sweep] pass failed: {}", e),
        }
    }
}

/// One sweep pass: erase every record past its expiry. Returns how many
/// were removed.
pub async fn sweep_once(state: &LimitState) -> Result<usize, StoreError> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    sweep_at(state, now_ms).await
}

pub(crate) async fn sweep_at(state: &LimitState, now_ms: i64) -> Result<usize, StoreError> {
    let records = state.store.all().await?;
    let mut removed = 0;
    for record in records {
        if record.expires_at != 0 && record.expires_at <= now_ms {
            // conditional erase: a login may have refreshed the binding
            // since the snapshot above, and that fresh record must survive
            match state.store.erase_expired(&record.address, now_ms).await {
                Ok(true) => removed += 1,
                // gone already (gate lazy-erase, admin) or refreshed
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("[sweep] erase failed address={} err={}", record.address, e);
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitConfig;
    use crate::store::{Store, YamlStore};

    fn temp_state(name: &str) -> (LimitState, std::path::PathBuf) {
        let path = std::env::temp_dir()
            .join(format!("iplimit_sweep_{}_{}.yml", name, std::process::id()));
        std::fs::remove_file(&path).ok();
        let store = Store::Yaml(YamlStore::open(&path).unwrap());
        (LimitState::new(store, LimitConfig::default()), path)
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (state, path) = temp_state("expired");
        state.store.put("1.1.1.1", "a", "A", 0).await.unwrap(); // permanent
        state.store.put("2.2.2.2", "b", "B", 500).await.unwrap(); // expired
        state.store.put("3.3.3.3", "c", "C", 5000).await.unwrap(); // live

        let removed = sweep_at(&state, 1000).await.unwrap();
        assert_eq!(removed, 1);
        assert!(state.store.get("1.1.1.1").await.unwrap().is_some());
        assert!(state.store.get("2.2.2.2").await.unwrap().is_none());
        assert!(state.store.get("3.3.3.3").await.unwrap().is_some());

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (state, path) = temp_state("idempotent");
        state.store.put("2.2.2.2", "b", "B", 500).await.unwrap();

        assert_eq!(sweep_at(&state, 1000).await.unwrap(), 1);
        assert_eq!(sweep_at(&state, 1000).await.unwrap(), 0);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_sweep_at_deadline_boundary() {
        let (state, path) = temp_state("boundary");
        state.store.put("2.2.2.2", "b", "B", 1000).await.unwrap();

        // expires_at == now counts as expired
        assert_eq!(sweep_at(&state, 1000).await.unwrap(), 1);

        std::fs::remove_file(path).ok();
    }
}
