/// Application name
pub const APP_NAME: &str = "natter";

/// Default session validity in days
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Longest session validity the server accepts from configuration
pub const MAX_SESSION_TTL_DAYS: i64 = 365;

/// Minimum length of the server-held session secret, in bytes
pub const MIN_SESSION_SECRET_LEN: usize = 32;

/// Random bytes mixed into every session token
pub const SESSION_NONCE_SIZE: usize = 16;

/// Argon2id memory cost in KiB (OWASP baseline)
pub const DEFAULT_PASSWORD_MEMORY_KIB: u32 = 19_456;

/// Argon2id iteration count
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 2;

/// Maximum number of results returned by a user search
pub const SEARCH_RESULT_LIMIT: u32 = 10;

/// Per-connection buffer of pending pushed messages
pub const PUSH_BUFFER_SIZE: usize = 64;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_SESSION_KEY: &str = "natter-session-mac-v1";
