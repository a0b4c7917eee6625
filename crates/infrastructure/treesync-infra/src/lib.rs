pub mod hashing;
pub mod hook;
pub mod net;

// Re-exports for convenience
pub use hashing::{digest_bytes, digest_file, digest_reader};
pub use hook::{CommandHook, HookError, PostApplyHook};
pub use net::{
    ByteStream, ClientIdentity, HttpTransport, HttpTransportConfig, Transport, TransportError,
};
