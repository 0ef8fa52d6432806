//! Global constants used throughout the Huddle codebase

/// Base62 character set used for human-readable IDs
pub const BASE62_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Number of base62 characters in a generated room id
///
/// 16 characters give ~95 bits of entropy, so collisions are not a practical concern.
pub const ROOM_ID_LENGTH: usize = 16;

/// Maximum number of peers in a call session
pub const CALL_CAPACITY: usize = 2;

/// Display name used for server-generated chat messages
pub const SYSTEM_USER: &str = "System";

/// First frame sent on a lobby connection
pub const LOBBY_GREETING: &str = "Connected";
