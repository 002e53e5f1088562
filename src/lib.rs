//! iplimit - address-to-account login binding
//!
//! Binds a client's network address to the first account that authenticates
//! from it and rejects later logins from that address by any other account
//! until a configured cooldown elapses (or forever, when the limit is 0).
//! The hosting runtime calls [`gate::LimitState::on_login_attempt`] from its
//! login callback; everything else here is record storage, the periodic
//! expiry sweep, and the admin command surface.

/// Runtime configuration (YAML file, mutated by admin commands)
pub mod config;
/// Binding record storage (YAML file or MySQL, behind one interface)
pub mod store;
/// Allow/deny decision for one (address, account) pair
pub mod policy;
/// Login entry point and deny-message rendering
pub mod gate;
/// Periodic eviction of expired bindings
pub mod sweeper;
/// Admin commands: enable/disable/timelimit/erase/bypass/unbypass/status/list
pub mod admin;
