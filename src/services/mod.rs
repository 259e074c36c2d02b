//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the economy rules and live session state so route
//! handlers can stay focused on protocol translation.

pub mod ledger;
pub mod persistence;
pub mod relay;
pub mod room;
pub mod session;
pub mod settlement;
pub mod timer;
