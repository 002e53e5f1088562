//! Administrative surface
//!
//! Inspect/override operations on the binding state plus the text command
//! dispatcher that drives them: `enable | disable | timelimit | erase |
//! bypass | unbypass | status | list [bypass]`. Authorization is the
//! caller's job; everything here assumes the sender is already trusted.
//!
//! Replies are plain text lines; the host decides how to render them.

use crate::gate::{format_remaining, LimitState};
use crate::store::{BindingRecord, BindingStore, StoreError};

const SUBCOMMANDS: [&str; 8] = [
    "enable", "disable", "timelimit", "erase", "bypass", "unbypass", "status", "list",
];

const TIMELIMIT_SUGGESTIONS: [&str; 6] = ["0", "10", "30", "60", "120", "1440"];

/// Read-only snapshot for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub enabled: bool,
    pub time_limit: u32,
    pub storage: &'static str,
    /// Live (non-expired) bindings only.
    pub active_records: u64,
    pub bypass_count: usize,
}

impl LimitState {
    pub fn set_enabled(&self, on: bool) {
        self.config.lock().unwrap().enabled = on;
        self.persist_config();
        tracing::info!("[admin] enabled={}", on);
    }

    /// Cooldown in minutes; 0 means bindings are permanent. Negative input
    /// never reaches here - the command parser rejects it while the value
    /// is still text.
    pub fn set_time_limit(&self, minutes: u32) {
        self.config.lock().unwrap().time_limit = minutes;
        self.persist_config();
        tracing::info!("[admin] time_limit={}", minutes);
    }

    /// Unconditional erase, ignoring owner and bypass status. Returns
    /// whether a record existed.
    pub async fn force_erase(&self, address: &str) -> Result<bool, StoreError> {
        let existed = self.store.erase(address).await?;
        if existed {
            tracing::info!("[admin] erased binding address={}", address);
        }
        Ok(existed)
    }

    /// Returns false if the address was already present (no-op).
    pub fn add_bypass(&self, address: &str) -> bool {
        let added = self.bypass.lock().unwrap().insert(address.to_string());
        if added {
            self.persist_config();
            tracing::info!("[admin] bypass added address={}", address);
        }
        added
    }

    /// Returns false if the address was never in the set (no-op).
    pub fn remove_bypass(&self, address: &str) -> bool {
        let removed = self.bypass.lock().unwrap().remove(address);
        if removed {
            self.persist_config();
            tracing::info!("[admin] bypass removed address={}", address);
        }
        removed
    }

    pub async fn status(&self) -> Result<StatusSnapshot, StoreError> {
        let (enabled, time_limit) = {
            let config = self.config.lock().unwrap();
            (config.enabled, config.time_limit)
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let active_records = self
            .store
            .all()
            .await?
            .iter()
            .filter(|r| r.is_live(now_ms))
            .count() as u64;
        Ok(StatusSnapshot {
            enabled,
            time_limit,
            storage: self.store.kind(),
            active_records,
            bypass_count: self.bypass.lock().unwrap().len(),
        })
    }

    /// Live bindings only; expired-but-unswept records are filtered out.
    pub async fn list_active(&self) -> Result<Vec<BindingRecord>, StoreError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut records = self.store.all().await?;
        records.retain(|r| r.is_live(now_ms));
        Ok(records)
    }

    pub fn list_bypass(&self) -> Vec<String> {
        let mut list: Vec<String> = self.bypass.lock().unwrap().iter().cloned().collect();
        list.sort();
        list
    }

    /// Write the current config (with the bypass set folded back in) to
    /// the config file. Failures are logged, not fatal - the in-memory
    /// state stays authoritative.
    fn persist_config(&self) {
        let path = match &self.config_path {
            Some(p) => p.clone(),
            None => return,
        };
        let snapshot = {
            let mut config = self.config.lock().unwrap();
            let mut ips: Vec<String> = self.bypass.lock().unwrap().iter().cloned().collect();
            ips.sort();
            config.bypass_ips = ips;
            config.clone()
        };
        if let Err(e) = snapshot.save(&path) {
            tracing::error!("[admin] config save failed path={} err={:#}", path.display(), e);
        }
    }
}

/// Dispatch one admin command. The first token is case-insensitive;
/// unknown or missing input yields the help text.
pub async fn handle_command(state: &LimitState, args: &[&str]) -> Vec<String> {
    let Some(&first) = args.first() else {
        return help();
    };

    match first.to_ascii_lowercase().as_str() {
        "enable" => {
            state.set_enabled(true);
            vec!["Address limit enabled!".to_string()]
        }
        "disable" => {
            state.set_enabled(false);
            vec!["Address limit disabled!".to_string()]
        }
        "timelimit" => {
            let Some(&arg) = args.get(1) else {
                return vec!["Usage: timelimit <minutes>".to_string()];
            };
            match arg.parse::<i64>() {
                Err(_) => vec!["Please enter a valid number!".to_string()],
                Ok(n) if n < 0 => vec!["Time limit cannot be negative!".to_string()],
                Ok(n) if n > i64::from(u32::MAX) => {
                    vec!["Time limit is too large!".to_string()]
                }
                Ok(n) => {
                    state.set_time_limit(n as u32);
                    if n == 0 {
                        vec!["Cooldown set to: permanent binding".to_string()]
                    } else {
                        vec![format!("Cooldown set to: {} minutes", n)]
                    }
                }
            }
        }
        "erase" => {
            let Some(&address) = args.get(1) else {
                return vec!["Usage: erase <address>".to_string()];
            };
            match state.force_erase(address).await {
                Ok(true) => vec![format!("Restriction for {} removed!", address)],
                Ok(false) => vec![format!("{} has no binding record", address)],
                Err(e) => vec![format!("Storage error: {}", e)],
            }
        }
        "bypass" => {
            let Some(&address) = args.get(1) else {
                return vec!["Usage: bypass <address>".to_string()];
            };
            if state.add_bypass(address) {
                vec![format!("Added {} to the bypass list", address)]
            } else {
                vec![format!("{} is already in the bypass list", address)]
            }
        }
        "unbypass" => {
            let Some(&address) = args.get(1) else {
                return vec!["Usage: unbypass <address>".to_string()];
            };
            if state.remove_bypass(address) {
                vec![format!("Removed {} from the bypass list", address)]
            } else {
                vec![format!("{} is not in the bypass list", address)]
            }
        }
        "status" => match state.status().await {
            Ok(s) => {
                vec![
                    "=== Address limit status ===".to_string(),
                    format!("Enabled: {}", if s.enabled { "yes" } else { "no" }),
                    if s.time_limit == 0 {
                        "Cooldown: permanent binding".to_string()
                    } else {
                        format!("Cooldown: {} minutes", s.time_limit)
                    },
                    format!("Storage: {}", s.storage),
                    format!("Active bindings: {}", s.active_records),
                    format!("Bypass entries: {}", s.bypass_count),
                ]
            }
            Err(e) => vec![format!("Storage error: {}", e)],
        },
        "list" => {
            if args.get(1).is_some_and(|a| a.eq_ignore_ascii_case("bypass")) {
                let mut lines = vec!["=== Bypass addresses ===".to_string()];
                let bypass = state.list_bypass();
                if bypass.is_empty() {
                    lines.push("No bypass addresses".to_string());
                } else {
                    for address in bypass {
                        lines.push(format!("- {}", address));
                    }
                }
                return lines;
            }
            let total = match state.store.count().await {
                Ok(n) => n,
                Err(e) => return vec![format!("Storage error: {}", e)],
            };
            let records = match state.list_active().await {
                Ok(r) => r,
                Err(e) => return vec![format!("Storage error: {}", e)],
            };
            let now_ms = chrono::Utc::now().timestamp_millis();
            let mut lines = vec![format!("=== Bound addresses ({}) ===", total)];
            if records.is_empty() {
                lines.push("No bound addresses".to_string());
            } else {
                for record in records {
                    if record.expires_at == 0 {
                        lines.push(format!(
                            "- {} (permanent) -> {}",
                            record.address, record.owner_name
                        ));
                    } else {
                        lines.push(format!(
                            "- {} ({}) -> {}",
                            record.address,
                            format_remaining(record.expires_at - now_ms),
                            record.owner_name
                        ));
                    }
                }
            }
            lines
        }
        _ => help(),
    }
}

/// Argument completion data for the command surface. The host wires this
/// into its own tab-completion convention.
pub async fn complete(state: &LimitState, args: &[&str]) -> Vec<String> {
    let mut out = match args {
        &[partial] => prefix_matches(partial, SUBCOMMANDS.iter().map(|s| s.to_string())),
        &[cmd, partial] => match cmd.to_ascii_lowercase().as_str() {
            "erase" => {
                let addresses: Vec<String> = state
                    .store
                    .all()
                    .await
                    .map(|records| records.into_iter().map(|r| r.address).collect())
                    .unwrap_or_default();
                prefix_matches(partial, addresses.into_iter())
            }
            "unbypass" => prefix_matches(partial, state.list_bypass().into_iter()),
            "timelimit" => {
                prefix_matches(partial, TIMELIMIT_SUGGESTIONS.iter().map(|s| s.to_string()))
            }
            "list" => prefix_matches(partial, std::iter::once("bypass".to_string())),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    out.sort();
    out
}

fn prefix_matches(partial: &str, candidates: impl Iterator<Item = String>) -> Vec<String> {
    let partial = partial.to_ascii_lowercase();
    candidates
        .filter(|c| c.to_ascii_lowercase().starts_with(&partial))
        .collect()
}

fn help() -> Vec<String> {
    vec![
        "=== Address limit commands ===".to_string(),
        "enable - turn the limit on".to_string(),
        "disable - turn the limit off".to_string(),
        "timelimit <minutes> - set the cooldown (0 = permanent)".to_string(),
        "erase <address> - force-remove a binding".to_string(),
        "bypass <address> - exempt an address from checks".to_string(),
        "unbypass <address> - remove an exemption".to_string(),
        "list - show bound addresses".to_string(),
        "list bypass - show the bypass list".to_string(),
        "status - show a state snapshot".to_string(),
    ]
}
