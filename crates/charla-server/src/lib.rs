//! Chat hub server library.
//! Exposes the transport and wiring modules so integration tests can run
//! the real listeners; the binary entry point is in main.rs.

pub mod config;
pub mod history;
pub mod rpc;
pub mod state;
pub mod ws;
