//! Access-control translation.
//!
//! The grid grants `own` / `modify` / `read` per user; POSIX wants mode
//! bits. Only the owner triplet is derived from the grant held by the
//! proxy/client user pair; group and other bits stay 0 for files. A
//! read-only mapping masks every write bit regardless of the grant, and
//! directories carry execute bits plus an 0555 floor so they stay
//! traversable.

use irods_fuse_client::{Access, AccessLevel};

/// Owner bits granted per access level for data objects.
fn file_bits(level: AccessLevel) -> u16 {
    match level {
        AccessLevel::Own => 0o700,
        AccessLevel::Modify => 0o600,
        AccessLevel::Read => 0o400,
        AccessLevel::None => 0o000,
    }
}

/// The strongest level granted to either of the two acting users.
///
/// # Arguments
/// * `accesses` - Grants on the entry
/// * `proxy_user` - Authenticating user
/// * `client_user` - Acting user
pub fn effective_level(
    accesses: &[Access],
    proxy_user: &str,
    client_user: &str,
) -> AccessLevel {
    accesses
        .iter()
        .filter(|a: &&Access| a.user_name == proxy_user || a.user_name == client_user)
        .map(|a: &Access| a.level)
        .max()
        .unwrap_or(AccessLevel::None)
}

/// Compute POSIX mode bits for an entry.
///
/// # Arguments
/// * `level` - Effective access level
/// * `read_only` - Entry is reached through a read-only mapping
/// * `is_dir` - Entry is a collection
pub fn mode_bits(level: AccessLevel, read_only: bool, is_dir: bool) -> u16 {
    let mut mode: u16 = file_bits(level);

    if is_dir {
        // execute where read is granted, with the traversal floor
        mode |= (mode & 0o444) >> 2;
        mode |= 0o555;
    }

    if read_only {
        mode &= !0o222;
    }

    mode
}
