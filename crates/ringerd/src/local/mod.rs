//! Local host implementations.
//!
//! Desktop and headless stand-ins for the platform services a phone would
//! provide: file and in-memory storage, fixed settings and permissions, a
//! logging notification presenter, a headless audio output and a tokio-based
//! background task host. They record what they were asked to do, so the
//! same types back the `ringerd` console and the test suite.

mod device;
mod storage;
mod task_host;

pub use device::{HeadlessAudio, RecordingNotifier, StaticPermissionGate, StaticSettings};
pub use storage::{FileIdentityStore, JsonlHistorySink, MemoryHistorySink, MemoryIdentityStore};
pub use task_host::TokioTaskHost;
