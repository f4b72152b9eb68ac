//! Connection admission: origin allowlist, custom verifier, capacity ceiling.
//!
//! Origin and verifier checks run before the upgrade completes; the capacity
//! check runs after the connection is registered, because an accurate count
//! only exists once the connection is in the set. An over-capacity
//! connection is closed with code 1013 so well-behaved clients retry later.

use std::sync::Arc;

use axum::http::{header, HeaderMap};

/// Close code sent to connections rejected for capacity ("try again later").
pub const TRY_AGAIN_LATER: u16 = 1013;

/// Predicate over the handshake request headers. Returning `false` rejects
/// the handshake before upgrade.
pub type VerifyClient = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

/// Why a handshake or connection was turned away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The `Origin` header is absent from, or not an exact member of, the
    /// configured allowlist.
    OriginMismatch,
    /// The custom verifier returned `false`.
    VerifierRejected,
    /// The post-accept connection count exceeded the ceiling.
    AtCapacity,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::OriginMismatch => "origin not in allowlist",
            Self::VerifierRejected => "verifier rejected request",
            Self::AtCapacity => "connection ceiling reached",
        };
        write!(f, "{reason}")
    }
}

/// Check the `Origin` header against an exact-match allowlist.
///
/// No allowlist means any origin (including none) is accepted.
pub fn check_origin(
    headers: &HeaderMap,
    allowlist: Option<&[String]>,
) -> Result<(), RejectReason> {
    let Some(allowed) = allowlist else {
        return Ok(());
    };
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    match origin {
        Some(origin) if allowed.iter().any(|entry| entry == origin) => Ok(()),
        _ => Err(RejectReason::OriginMismatch),
    }
}

/// Run the full pre-upgrade admission sequence: origin, then verifier.
pub fn check_handshake(
    headers: &HeaderMap,
    allowlist: Option<&[String]>,
    verifier: Option<&VerifyClient>,
) -> Result<(), RejectReason> {
    check_origin(headers, allowlist)?;
    if let Some(verify) = verifier {
        if !verify(headers) {
            return Err(RejectReason::VerifierRejected);
        }
    }
    Ok(())
}

/// Whether `current` connections exceed the ceiling. `max == 0` is unlimited.
#[must_use]
pub fn over_capacity(current: usize, max: usize) -> bool {
    max > 0 && current > max
}
