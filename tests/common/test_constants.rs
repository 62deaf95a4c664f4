//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared constants under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Instance name used across lifecycle scenarios.
pub const MACHINE_NAME: &str = "build-agent-1";

/// Public address handed out by the scripted provider.
pub const PUBLIC_IP: &str = "203.0.113.20";

/// Public key whose comment names the `deploy` user.
pub const DEPLOY_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIDeploy deploy@workstation";
