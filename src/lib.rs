//! =============================================================================
//! Crate Entry Points
//! =============================================================================
//!
//! The codebase is structured around a handful of high-level subsystems
//! (configuration, backend discovery, process management, RPC bridging,
//! protocol translators) so each concern can evolve in isolation.  The
//! linked-editing adapter in `protocol::text_document` is the feature core;
//! everything else exists to feed it documents, a provider, and requests.

pub mod cancel;
pub mod config;
pub mod documents;
pub mod process;
pub mod protocol;
pub mod provider;
pub mod rpc;
pub mod server;
pub mod types;
pub mod utils;

pub use config::Settings;
pub use server::run_stdio_server;
