//! Default values for the settings enumerated in spec.md §6.
//!
//! Defaults live here as plain constants (mirrors `chronx-core::constants`);
//! `Setting` rows in the store override them, and CLI flags / env vars
//! override the store (see `config::ConfigLayer`).

/// `verification_period_hours` — default 24, valid range 1..=8760.
pub const DEFAULT_VERIFICATION_PERIOD_HOURS: u32 = 24;
pub const MIN_VERIFICATION_PERIOD_HOURS: u32 = 1;
pub const MAX_VERIFICATION_PERIOD_HOURS: u32 = 8760;

/// `file_access_limit` — default 3, minimum 1.
pub const DEFAULT_FILE_ACCESS_LIMIT: u32 = 3;
pub const MIN_FILE_ACCESS_LIMIT: u32 = 1;

/// `verification_token_ttl_seconds` — default 600 (10 minutes).
pub const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 600;

/// `auto_delete_seconds` — default 600 (10 minutes).
pub const DEFAULT_AUTO_DELETE_SECONDS: i64 = 600;

/// `min_traversal_seconds` — the dwell floor between token creation and
/// accepted validation. Default 5.
pub const DEFAULT_MIN_TRAVERSAL_SECONDS: i64 = 5;

/// `min_dwell_seconds` — the dwell floor between advance (IN_FLIGHT) and
/// accepted validation. Default 3.
pub const DEFAULT_MIN_DWELL_SECONDS: i64 = 3;

/// Client-visible countdown delay on the `/v` page. UX only — the real
/// security control is the server-side dwell floors above.
pub const COUNTDOWN_DISPLAY_SECONDS: u64 = 5;

/// Short-TTL cache lifetime for membership checks and cached `Setting` reads.
pub const CACHE_TTL_SECONDS: i64 = 30;

/// Grace period past `expires_at` before a sled-evictable token may actually
/// be purged. User entitlement records are never evicted (spec.md §4.1).
pub const TOKEN_EVICTION_GRACE_SECONDS: i64 = 24 * 3600;

/// Bounded retry policy for Transient collaborator errors (spec.md §7):
/// at most 3 attempts, backoff 50ms → 250ms → 1s.
pub const TRANSIENT_RETRY_BACKOFFS_MS: [u64; 3] = [50, 250, 1000];

/// Broadcast fan-out rate limit (spec.md §5): at most 20 messages/second
/// per bot token.
pub const BROADCAST_MAX_MESSAGES_PER_SECOND: u32 = 20;
