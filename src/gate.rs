//! Login gate
//!
//! The single entry point the hosting runtime calls from its login
//! callback. Owns the shared state (store, config, bypass set) and turns a
//! policy decision into allow, or deny with a rendered reason the host can
//! display. A store failure on this path fails closed: an unverifiable
//! login is denied, never waved through.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::TimeZone;

use crate::config::LimitConfig;
use crate::policy::{self, Decision};
use crate::store::{BindingStore, Store};

/// Result of a login attempt, for the host to act on before the callback
/// returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Allow,
    Deny(String),
}

/// Shared state for the gate, sweeper and admin surface.
///
/// Config and bypass set are small and rarely written; a plain mutex each
/// is enough. `login_lock` serializes the evaluate+put pair so two
/// concurrent logins from one address cannot both observe "unbound".
pub struct LimitState {
    pub(crate) store: Store,
    pub(crate) config: Mutex<LimitConfig>,
    pub(crate) config_path: Option<PathBuf>,
    pub(crate) bypass: Mutex<HashSet<String>>,
    login_lock: tokio::sync::Mutex<()>,
}

impl LimitState {
    pub fn new(store: Store, config: LimitConfig) -> Self {
        Self::with_config_path(store, config, None)
    }

    /// `config_path` is where admin mutations are persisted; `None` keeps
    /// the config in memory only (tests).
    pub fn with_config_path(
        store: Store,
        config: LimitConfig,
        config_path: Option<PathBuf>,
    ) -> Self {
        let bypass: HashSet<String> = config.bypass_ips.iter().cloned().collect();
        Self {
            store,
            config: Mutex::new(config),
            config_path,
            bypass: Mutex::new(bypass),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Decide one login attempt. Called synchronously by the host before
    /// the session is established.
    pub async fn on_login_attempt(
        &self,
        address: &str,
        owner_id: &str,
        owner_name: &str,
    ) -> GateResult {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.attempt_at(address, owner_id, owner_name, now_ms).await
    }

    pub(crate) async fn attempt_at(
        &self,
        address: &str,
        owner_id: &str,
        owner_name: &str,
        now_ms: i64,
    ) -> GateResult {
        let (enabled, time_limit) = {
            let config = self.config.lock().unwrap();
            (config.enabled, config.time_limit)
        };
        if !enabled {
            return GateResult::Allow;
        }

        // clone so no std lock is held across an await
        let bypass = self.bypass.lock().unwrap().clone();

        let _guard = self.login_lock.lock().await;
        match policy::evaluate(&self.store, &bypass, address, owner_id, now_ms).await {
            Ok(Decision::Allowed) => {
                if bypass.contains(address) {
                    // bypassed addresses never get a record
                    return GateResult::Allow;
                }
                let expires_at = if time_limit == 0 {
                    0
                } else {
                    now_ms + i64::from(time_limit) * 60_000
                };
                match self.store.put(address, owner_id, owner_name, expires_at).await {
                    Ok(()) => {
                        tracing::debug!(
                            "[gate] [bound] address={} owner={} expires_at={}",
                            address,
                            owner_id,
                            expires_at
                        );
                        GateResult::Allow
                    }
                    Err(e) => {
                        tracing::error!("[gate] [store_error] put address={} err={}", address, e);
                        GateResult::Deny(verify_failure_message())
                    }
                }
            }
            Ok(Decision::Denied {
                owner_id: bound_id,
                owner_name: bound_name,
                expires_at,
            }) => {
                tracing::info!(
                    "[gate] [denied] address={} candidate={} bound_to={}",
                    address,
                    owner_id,
                    bound_id
                );
                let reason = if expires_at == 0 {
                    permanent_deny_message(address, &bound_id, &bound_name)
                } else {
                    temporary_deny_message(address, &bound_id, &bound_name, expires_at, now_ms)
                };
                GateResult::Deny(reason)
            }
            Err(e) => {
                // fail closed: cannot verify the binding, so deny
                tracing::error!("[gate] [store_error] get address={} err={}", address, e);
                GateResult::Deny(verify_failure_message())
            }
        }
    }
}

fn verify_failure_message() -> String {
    "Address restriction check is temporarily unavailable.\n\
     Please try again later or contact an administrator."
        .to_string()
}

/// Label for the bound account: display name when known, otherwise a
/// shortened identity token.
fn owner_label(owner_id: &str, owner_name: &str) -> String {
    if !owner_name.is_empty() {
        return owner_name.to_string();
    }
    let prefix: String = owner_id.chars().take(8).collect();
    format!("{}...", prefix)
}

fn permanent_deny_message(address: &str, owner_id: &str, owner_name: &str) -> String {
    format!(
        "Address login restriction\n\
         ========================\n\
         Your address: {}\n\
         Restriction: permanent binding\n\
         Bound account: {}\n\
         This address is bound to another account.\n\
         Contact an administrator to lift the restriction.\n\
         ========================",
        address,
        owner_label(owner_id, owner_name),
    )
}

fn temporary_deny_message(
    address: &str,
    owner_id: &str,
    owner_name: &str,
    expires_at: i64,
    now_ms: i64,
) -> String {
    format!(
        "Address login restriction\n\
         ========================\n\
         Your address: {}\n\
         Restriction: temporary binding\n\
         Bound account: {}\n\
         Time remaining: {}\n\
         Unbinds at: {}\n\
         Wait for the cooldown to end or contact an administrator.\n\
         ========================",
        address,
        owner_label(owner_id, owner_name),
        format_remaining(expires_at - now_ms),
        format_timestamp(expires_at),
    )
}

/// Render a millisecond duration as "1d 2h 3m" (minutes always shown when
/// nothing larger is).
pub(crate) fn format_remaining(ms: i64) -> String {
    if ms <= 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}d", days));
    }
    if hours > 0 {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 || out.is_empty() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("{}m", minutes));
    }
    out
}

/// Absolute local-time rendering of a unix-millisecond timestamp.
pub(crate) fn format_timestamp(ms: i64) -> String {
    match chrono::Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{}", ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::YamlStore;

    fn temp_state(name: &str, config: LimitConfig) -> (LimitState, std::path::PathBuf) {
        let path = std::env::temp_dir()
            .join(format!("iplimit_gate_{}_{}.yml", name, std::process::id()));
        std::fs::remove_file(&path).ok();
        let store = Store::Yaml(YamlStore::open(&path).unwrap());
        (LimitState::new(store, config), path)
    }

    #[tokio::test]
    async fn test_disabled_allows_without_record() {
        let mut config = LimitConfig::default();
        config.enabled = false;
        let (state, path) = temp_state("disabled", config);

        let result = state.attempt_at("1.2.3.4", "alice", "Alice", 1000).await;
        assert_eq!(result, GateResult::Allow);
        assert_eq!(state.store.count().await.unwrap(), 0);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_permanent_binding_denies_second_account() {
        let mut config = LimitConfig::default();
        config.time_limit = 0;
        let (state, path) = temp_state("permanent", config);

        assert_eq!(
            state.attempt_at("1.2.3.4", "uuid-alice", "Alice", 1000).await,
            GateResult::Allow
        );
        let rec = state.store.get("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(rec.owner_id, "uuid-alice");
        assert_eq!(rec.expires_at, 0);

        let denied = state.attempt_at("1.2.3.4", "uuid-bob", "Bob", 2000).await;
        match denied {
            GateResult::Deny(reason) => {
                assert!(reason.contains("Alice"));
                assert!(reason.contains("permanent"));
            }
            GateResult::Allow => panic!("second account must be denied"),
        }

        // still bound to alice
        let rec = state.store.get("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(rec.owner_id, "uuid-alice");

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry_same_owner() {
        let mut config = LimitConfig::default();
        config.time_limit = 10;
        let (state, path) = temp_state("refresh", config);

        state.attempt_at("1.2.3.4", "alice", "Alice", 1_000).await;
        let first = state.store.get("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(first.expires_at, 1_000 + 10 * 60_000);

        state.attempt_at("1.2.3.4", "alice", "Alice", 5_000).await;
        let second = state.store.get("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(second.owner_id, "alice");
        assert_eq!(second.expires_at, 5_000 + 10 * 60_000);
        assert!(second.expires_at > first.expires_at);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_temporary_deny_reason_has_times() {
        let mut config = LimitConfig::default();
        config.time_limit = 10;
        let (state, path) = temp_state("temporary", config);

        state.attempt_at("1.2.3.4", "alice", "Alice", 0).await;
        let denied = state.attempt_at("1.2.3.4", "bob", "Bob", 60_000).await;
        match denied {
            GateResult::Deny(reason) => {
                assert!(reason.contains("temporary"));
                assert!(reason.contains("Time remaining: 9m"));
                assert!(reason.contains("Unbinds at:"));
            }
            GateResult::Allow => panic!("expected denial inside cooldown"),
        }

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_expired_binding_rebinds_to_new_owner() {
        let mut config = LimitConfig::default();
        config.time_limit = 1;
        let (state, path) = temp_state("rebind", config);

        state.attempt_at("1.2.3.4", "alice", "Alice", 0).await;
        // 1 minute limit expired long ago at t=10min
        let result = state.attempt_at("1.2.3.4", "bob", "Bob", 600_000).await;
        assert_eq!(result, GateResult::Allow);

        let rec = state.store.get("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(rec.owner_id, "bob");

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_bypass_allows_and_creates_no_record() {
        let mut config = LimitConfig::default();
        config.bypass_ips.push("1.2.3.4".to_string());
        let (state, path) = temp_state("bypass", config);

        // even with an existing binding for another account
        state.store.put("1.2.3.4", "alice", "Alice", 0).await.unwrap();
        let result = state.attempt_at("1.2.3.4", "bob", "Bob", 1000).await;
        assert_eq!(result, GateResult::Allow);

        // record untouched, no rebind
        let rec = state.store.get("1.2.3.4").await.unwrap().unwrap();
        assert_eq!(rec.owner_id, "alice");

        std::fs::remove_file(path).ok();
    }

    // Two simultaneous logins from one address must not both observe
    // "unbound" and both bind.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins_same_address_one_owner_wins() {
        use std::sync::Arc;

        let mut config = LimitConfig::default();
        config.time_limit = 0;
        let (state, path) = temp_state("login_race", config);
        let state = Arc::new(state);

        for i in 0..50 {
            let s1 = Arc::clone(&state);
            let s2 = Arc::clone(&state);
            let alice = tokio::spawn(async move {
                s1.attempt_at("1.2.3.4", "uuid-alice", "Alice", 1000).await
            });
            let bob = tokio::spawn(async move {
                s2.attempt_at("1.2.3.4", "uuid-bob", "Bob", 1000).await
            });
            let ra = alice.await.unwrap();
            let rb = bob.await.unwrap();

            let allows =
                u32::from(ra == GateResult::Allow) + u32::from(rb == GateResult::Allow);
            assert_eq!(allows, 1, "iteration {}: exactly one login must bind", i);

            let rec = state.store.get("1.2.3.4").await.unwrap().unwrap();
            let winner = if ra == GateResult::Allow {
                "uuid-alice"
            } else {
                "uuid-bob"
            };
            assert_eq!(rec.owner_id, winner, "iteration {}", i);

            state.store.erase("1.2.3.4").await.unwrap();
        }

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let path = std::env::temp_dir()
            .join(format!("iplimit_gate_failclosed_{}.yml", std::process::id()));
        std::fs::write(&path, "bindings: {broken").unwrap();
        let store = Store::Yaml(YamlStore::open(&path).unwrap());
        let state = LimitState::new(store, LimitConfig::default());

        let result = state.attempt_at("1.2.3.4", "alice", "Alice", 1000).await;
        match result {
            GateResult::Deny(reason) => assert!(reason.contains("temporarily unavailable")),
            GateResult::Allow => panic!("unverifiable login must be denied"),
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_owner_label_falls_back_to_short_id() {
        assert_eq!(owner_label("id", "Alice"), "Alice");
        assert_eq!(
            owner_label("0123456789abcdef", ""),
            "01234567..."
        );
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(-5), "0m");
        assert_eq!(format_remaining(30_000), "0m");
        assert_eq!(format_remaining(5 * 60_000), "5m");
        assert_eq!(format_remaining(90 * 60_000), "1h 30m");
        assert_eq!(format_remaining((24 * 60 + 61) * 60_000), "1d 1h 1m");
        assert_eq!(format_remaining(2 * 60 * 60_000), "2h");
    }
}
