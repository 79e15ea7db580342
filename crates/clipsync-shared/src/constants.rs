/// Path of the session WebSocket endpoint on the relay.
pub const HUB_PATH: &str = "/hub/clipboard";

/// Application name
pub const APP_NAME: &str = "ClipboardSync";

/// SHA-256 digest size in bytes
pub const HASH_SIZE: usize = 32;

/// Hard cap on inline clipboard text, in UTF-8 bytes (256 KiB)
pub const MAX_TEXT_BYTES: usize = 256 * 1024;

/// Default client-side cap on inline clipboard text (64 KiB)
pub const DEFAULT_CLIENT_TEXT_BYTES: usize = 64 * 1024;

/// Hard cap on a relayed file payload (10 MiB)
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Default WebSocket message limit; leaves room for framing around a max-size file.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 12 * 1024 * 1024;

/// Per-room history ring size
pub const HISTORY_CAPACITY: usize = 10;

/// Bounds applied to `GetHistory` limits
pub const HISTORY_LIMIT_MIN: usize = 1;
pub const HISTORY_LIMIT_MAX: usize = 100;

/// History titles and previews are truncated to this many characters.
pub const PREVIEW_CHARS: usize = 120;

/// Room joined in account mode when the client does not name one.
pub const DEFAULT_ROOM_ID: &str = "default";

pub const DEFAULT_FILE_NAME: &str = "file.bin";
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";
pub const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Loop guard defaults, in milliseconds.
pub const IGNORE_LOCAL_AFTER_REMOTE_MS: i64 = 600;
pub const LOCAL_DEBOUNCE_MS: i64 = 200;
