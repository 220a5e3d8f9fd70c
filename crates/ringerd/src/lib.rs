//! ringer runtime - call orchestration on the client device
//!
//! - `orchestrator` - Call state machine actor and its handle
//! - `ring` - Ringtone, notification and auto-timeout for a ringing call
//! - `keepalive` - Periodic background reconnect registration
//! - `signaling` - Signaling channel contract and an in-process loopback
//! - `host` - Device collaborator contracts (storage, audio, notifications, task host)
//! - `local` - Local implementations of the host contracts
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         ringerd                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ SignalingAdapter│────▶│     CallOrchestrator        │    │
//! │  │  (events in)    │◀────│  (call state owner)         │    │
//! │  └─────────────────┘     └──────┬──────────────┬───────┘    │
//! │                                 │              │            │
//! │                                 ▼              ▼            │
//! │  ┌─────────────────┐     ┌─────────────┐ ┌──────────────┐   │
//! │  │ BackgroundTask  │◀────│ Keepalive   │ │     Ring     │   │
//! │  │      Host       │     │ Scheduler   │ │ Coordinator  │   │
//! │  └─────────────────┘     └─────────────┘ └──────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod host;
pub mod keepalive;
pub mod local;
pub mod orchestrator;
pub mod ring;
pub mod signaling;
