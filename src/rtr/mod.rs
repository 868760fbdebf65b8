//! The RPKI to Router Protocol.
//!
//! See RFC 6810 (version 0) and RFC 8210 (version 1) for the wire
//! protocol this module implements.

pub use self::conn::ConnConfig;
pub use self::listener::run;

pub mod pdu;
pub mod serial;

mod conn;
mod listener;
