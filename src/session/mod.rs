//! Cookie-backed server-side sessions for the web transport.
//!
//! The browser only ever holds an opaque random identifier. Session data
//! lives in a `SessionStore`, keyed by the SHA-256 digest of that
//! identifier. `load_session` opens the session before the handler runs and
//! commits it afterwards; handlers use the `Session` extractor.

pub mod cookie;
mod handle;
mod layer;
mod store;

pub use handle::Session;
pub use layer::{SessionManager, load_session};
pub use store::{MemorySessionStore, SessionRecord, SessionStore};
