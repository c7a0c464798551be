//! Piano single-server PIR implementation.
//!
//! Based on "Piano: Extremely Simple, Single-Server PIR with Sublinear
//! Server Computation" (https://eprint.iacr.org/2023/452).

pub mod params;
pub mod prf;
pub mod entry;
pub mod hints;
pub mod messages;
pub mod transport;
pub mod preprocess;
pub mod client;
pub mod server;

pub use client::QueryClient;
pub use entry::DbEntry;
pub use params::Params;
pub use prf::Prf;
