//! Attribute Protocol ([Vol 3] Part F) status codes.
//!
//! Every response that the server sends to a client carries a status. A
//! successful operation is represented by `Ok(())` and encoded as `0x00`. All
//! other outcomes are [`ErrorCode`]s.

pub use consts::*;

mod consts;

/// Attribute operation status.
pub type Status = std::result::Result<(), ErrorCode>;

/// Returns the raw status code sent to the client.
#[inline]
#[must_use]
pub fn status_code(s: Status) -> u8 {
    s.map_or_else(u8::from, |_| 0x00)
}

/// Converts an application-supplied status name into a response status.
/// `"success"` (case-insensitive) maps to `Ok(())`, recognized error names map
/// to their codes, and anything else becomes a generic
/// [`ErrorCode::UnlikelyError`].
#[must_use]
pub fn parse_status(name: &str) -> Status {
    if name.eq_ignore_ascii_case("success") {
        return Ok(());
    }
    Err(ErrorCode::from_name(name).unwrap_or(ErrorCode::UnlikelyError))
}
