//! RPKI relying-party validation and RTR serving.
//!
//! The _Resource Public Key Infrastructure_ (RPKI) is an application of
//! PKI to Internet routing security. It allows owners of IP address prefixes
//! to publish cryptographically signed associations of their prefixes to
//! autonomous systems, allowing the validation of the origin of a route
//! announcement in BGP.
//!
//! This crate builds a VRP Store from a set of Trust Anchor Locators,
//! refreshing it on a fixed schedule (see [`operation::Driver`]), and
//! serves it to routers over the RPKI-to-Router protocol (see [`rtr`]).
//! Fetching repository objects and walking their certificate trees are
//! external-collaborator seams ([`cache::Fetcher`],
//! [`validation::TreeWalker`]); this crate covers the relying-party
//! database and protocol machinery around them, not the cryptography
//! itself.

pub mod cache;
pub mod config;
pub mod error;
pub mod log;
pub mod operation;
pub mod payload;
pub mod process;
pub mod rtr;
pub mod tal;
pub mod validation;

