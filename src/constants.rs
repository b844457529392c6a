//! Wire and namespace constants shared by every bus participant.
//!
//! All processes attached to the same hub must agree on these values, so
//! they live in one place rather than next to the code that happens to use
//! them first.
//!
//! # Categories
//!
//! - **Framing**: the field delimiter of the text wire frame
//! - **Namespacing**: reserved tokens and key suffixes under a hub name

// ============================================================================
// Framing
// ============================================================================

/// Field separator of the wire frame: forward slash followed by backslash.
///
/// Frames are `<source>/\<channel>/\<payload>`. Multi-part payloads built by
/// [`crate::codec::join_parts`] reuse the same separator.
pub const DELIMITER: &str = "/\\";

/// Number of fields in a wire frame.
pub const FRAME_FIELDS: usize = 3;

// ============================================================================
// Namespacing
// ============================================================================

/// Reserved destination token addressing the hub process.
///
/// The hub registers this token (not a worker name) in the server set, and
/// subscribes to `"{hub_name}:HUB"`.
pub const HUB_TOKEN: &str = "HUB";

/// Suffix of the registry set key, giving `"{hub_name}:servers"`.
pub const SERVERS_KEY_SUFFIX: &str = "servers";

/// Separator between a hub name and the token that follows it.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Log target for per-frame tracing enabled by the runtime debug toggle.
pub const TRACE_TARGET: &str = "hubbus::trace";
