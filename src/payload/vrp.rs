//! The two payload item types carried by the protocol: VRPs and router
//! keys.

use std::net::{Ipv4Addr, Ipv6Addr};
use bytes::Bytes;


//------------ Vrp -------------------------------------------------------

/// A Validated ROA Payload.
///
/// Two VRPs compare equal if and only if their ASN, prefix, and maximum
/// length all match. The protocol family is implied by the prefix
/// variant and therefore not a separate comparison key.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct Vrp {
    pub asn: u32,
    pub prefix: Prefix,
    pub max_length: u8,
}

impl Vrp {
    pub fn new(asn: u32, prefix: Prefix, max_length: u8) -> Self {
        Vrp { asn, prefix, max_length }
    }

    /// Returns the RTR protocol family this VRP belongs to.
    pub fn family(&self) -> Afi {
        self.prefix.family()
    }
}


//------------ Prefix ------------------------------------------------------

/// An IPv4 or IPv6 prefix.
///
/// `Ord` orders all IPv4 prefixes before all IPv6 prefixes, then by
/// address, then by prefix length -- this total order is what the
/// delta's sorted merge-join relies on.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Prefix {
    V4(Ipv4Addr, u8),
    V6(Ipv6Addr, u8),
}

impl Prefix {
    pub fn family(&self) -> Afi {
        match self {
            Prefix::V4(..) => Afi::Ipv4,
            Prefix::V6(..) => Afi::Ipv6,
        }
    }

    pub fn addr_len(&self) -> u8 {
        match self {
            Prefix::V4(_, len) => *len,
            Prefix::V6(_, len) => *len,
        }
    }
}


//------------ Afi ----------------------------------------------------------

/// An address family as used on the RTR wire (and in prefix matching).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Afi {
    Ipv4,
    Ipv6,
}


//------------ RouterKey -----------------------------------------------------

/// A validated BGPsec router key.
///
/// Only relevant to RTR protocol version 1 and above.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub struct RouterKey {
    pub asn: u32,
    pub subject_key_identifier: [u8; 20],
    pub subject_public_key_info: Bytes,
}

impl RouterKey {
    pub fn new(
        asn: u32,
        subject_key_identifier: [u8; 20],
        subject_public_key_info: Bytes,
    ) -> Self {
        RouterKey { asn, subject_key_identifier, subject_public_key_info }
    }
}
