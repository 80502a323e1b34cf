//! Core types, policy evaluation and the attendance decision engine.
//!
//! No HTTP or database code lives here. Storage backends implement
//! [`store::AttendanceStore`]; the server wires the engine to a concrete
//! store, a reader adapter and a notification fan-out.

pub mod attendance;
pub mod engine;
pub mod error;
pub mod intake;
pub mod notify;
pub mod policy;
pub mod reader;
pub mod scan;
pub mod store;
pub mod subject;

pub use error::{Error, Result};
