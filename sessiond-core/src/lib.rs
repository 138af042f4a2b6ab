//! Core of the session-state backend: the record codec, document schema,
//! store bootstrap, lock protocol, and session store API (C1-C5). The
//! provider facade (C6) that sits on top of this crate lives in
//! `sessiond-provider`.

pub mod bootstrap;
pub mod clock;
pub mod codec;
pub mod config;
#[cfg(feature = "cosmos")]
pub mod cosmos;
pub mod lock;
pub mod memory;
pub mod schema;
pub mod session;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use codec::{Dictionary, RawBytesCodec, SessionDictionaryCodec, SessionValue};
pub use lock::{AcquireResult, LockManager};
pub use memory::InMemoryDocumentStore;
pub use schema::{ContentRecord, LockRecord};
pub use session::{SessionApi, SessionRead, StashedResource};
pub use store::{DocumentStore, LockScriptResult};
