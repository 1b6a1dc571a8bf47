//! Mount instance identifiers.
//!
//! Each mount gets a random identifier that stays stable for the lifetime
//! of the process. It names the per-instance working directory and the
//! default log file, so two mounts on the same host never collide.

use std::sync::OnceLock;

use uuid::Uuid;

static INSTANCE_ID: OnceLock<String> = OnceLock::new();

/// Get the process-wide mount instance identifier.
///
/// Generated once on first use; every later call returns the same value.
pub fn instance_id() -> &'static str {
    INSTANCE_ID.get_or_init(|| Uuid::new_v4().simple().to_string())
}
