//! Paging Limits
//!
//! List operations (`nodes`, `locations`) return pages bounded by these limits.

/// Largest page a caller may request.
///
/// Requests above this are rejected rather than clamped so a client never
/// silently receives fewer rows than it asked for.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size used when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: u32 = MAX_PAGE_LIMIT;
