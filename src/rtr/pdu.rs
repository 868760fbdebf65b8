//! The RTR wire protocol's binary PDU formats.
//!
//! Every PDU starts with the eight-byte header described in RFC 6810 /
//! RFC 8210: protocol version, PDU type, a two-byte field whose meaning
//! depends on the PDU type, and a four-byte total length. All multi-byte
//! integers are big-endian.

use std::net::{Ipv4Addr, Ipv6Addr};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use super::serial::Serial;


//------------ PDU type codes --------------------------------------------------

pub const SERIAL_NOTIFY: u8 = 0;
pub const SERIAL_QUERY: u8 = 1;
pub const RESET_QUERY: u8 = 2;
pub const CACHE_RESPONSE: u8 = 3;
pub const IPV4_PREFIX: u8 = 4;
pub const IPV6_PREFIX: u8 = 6;
pub const END_OF_DATA: u8 = 7;
pub const CACHE_RESET: u8 = 8;
pub const ROUTER_KEY: u8 = 9;
pub const ERROR_REPORT: u8 = 10;

pub const HEADER_LEN: usize = 8;


//------------ Header ---------------------------------------------------------

/// The eight-byte header prefixing every PDU.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub version: u8,
    pub pdu_type: u8,
    /// Raw value of the header's third/fourth bytes. Its meaning
    /// (session id, flags, or error code) depends on `pdu_type`.
    pub field: u16,
    pub length: u32,
}

impl Header {
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Self {
        Header {
            version: buf[0],
            pdu_type: buf[1],
            field: u16::from_be_bytes([buf[2], buf[3]]),
            length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    fn write(&self, out: &mut BytesMut) {
        out.put_u8(self.version);
        out.put_u8(self.pdu_type);
        out.put_u16(self.field);
        out.put_u32(self.length);
    }
}


//------------ PduError ---------------------------------------------------------

/// A malformed PDU, per the wire-framing rules of the protocol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PduError {
    /// The declared length was less than the header size.
    TooShort(u32),

    /// The declared length didn't match what this PDU type expects.
    BadLength { pdu_type: u8, expected: u32, actual: u32 },

    /// The PDU type isn't one we know about.
    UnknownType(u8),
}


//------------ Pdu --------------------------------------------------------------

/// A fully parsed RTR PDU.
#[derive(Clone, Debug)]
pub enum Pdu {
    SerialNotify { version: u8, session_id: u16, serial: Serial },
    SerialQuery { version: u8, session_id: u16, serial: Serial },
    ResetQuery { version: u8 },
    CacheResponse { version: u8, session_id: u16 },
    Ipv4Prefix {
        version: u8,
        announce: bool,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv4Addr,
        asn: u32,
    },
    Ipv6Prefix {
        version: u8,
        announce: bool,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv6Addr,
        asn: u32,
    },
    EndOfData {
        version: u8,
        session_id: u16,
        serial: Serial,
        /// `None` for version 0, where no timers are carried.
        timers: Option<Timers>,
    },
    CacheReset { version: u8 },
    RouterKey {
        version: u8,
        announce: bool,
        subject_key_identifier: [u8; 20],
        asn: u32,
        subject_public_key_info: Bytes,
    },
    ErrorReport {
        version: u8,
        error_code: u16,
        /// The raw bytes of the PDU that caused the error, if any.
        erroneous_pdu: Bytes,
        text: String,
    },
}

/// The three interval timers carried by an End of Data PDU for protocol
/// version 1 and above.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timers {
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

impl Pdu {
    pub fn version(&self) -> u8 {
        match *self {
            Pdu::SerialNotify { version, .. }
            | Pdu::SerialQuery { version, .. }
            | Pdu::ResetQuery { version }
            | Pdu::CacheResponse { version, .. }
            | Pdu::Ipv4Prefix { version, .. }
            | Pdu::Ipv6Prefix { version, .. }
            | Pdu::EndOfData { version, .. }
            | Pdu::CacheReset { version }
            | Pdu::RouterKey { version, .. }
            | Pdu::ErrorReport { version, .. } => version,
        }
    }

    pub fn pdu_type(&self) -> u8 {
        match self {
            Pdu::SerialNotify { .. } => SERIAL_NOTIFY,
            Pdu::SerialQuery { .. } => SERIAL_QUERY,
            Pdu::ResetQuery { .. } => RESET_QUERY,
            Pdu::CacheResponse { .. } => CACHE_RESPONSE,
            Pdu::Ipv4Prefix { .. } => IPV4_PREFIX,
            Pdu::Ipv6Prefix { .. } => IPV6_PREFIX,
            Pdu::EndOfData { .. } => END_OF_DATA,
            Pdu::CacheReset { .. } => CACHE_RESET,
            Pdu::RouterKey { .. } => ROUTER_KEY,
            Pdu::ErrorReport { .. } => ERROR_REPORT,
        }
    }

    /// Serializes the PDU to its exact wire bytes.
    pub fn write(&self, out: &mut BytesMut) {
        match *self {
            Pdu::SerialNotify { version, session_id, serial } => {
                Header { version, pdu_type: SERIAL_NOTIFY, field: session_id, length: 12 }
                    .write(out);
                out.put_u32(serial.0);
            }
            Pdu::SerialQuery { version, session_id, serial } => {
                Header { version, pdu_type: SERIAL_QUERY, field: session_id, length: 12 }
                    .write(out);
                out.put_u32(serial.0);
            }
            Pdu::ResetQuery { version } => {
                Header { version, pdu_type: RESET_QUERY, field: 0, length: 8 }
                    .write(out);
            }
            Pdu::CacheResponse { version, session_id } => {
                Header { version, pdu_type: CACHE_RESPONSE, field: session_id, length: 8 }
                    .write(out);
            }
            Pdu::Ipv4Prefix { version, announce, prefix_len, max_len, prefix, asn } => {
                Header { version, pdu_type: IPV4_PREFIX, field: 0, length: 20 }
                    .write(out);
                out.put_u8(u8::from(announce));
                out.put_u8(prefix_len);
                out.put_u8(max_len);
                out.put_u8(0);
                out.put_slice(&prefix.octets());
                out.put_u32(asn);
            }
            Pdu::Ipv6Prefix { version, announce, prefix_len, max_len, prefix, asn } => {
                Header { version, pdu_type: IPV6_PREFIX, field: 0, length: 32 }
                    .write(out);
                out.put_u8(u8::from(announce));
                out.put_u8(prefix_len);
                out.put_u8(max_len);
                out.put_u8(0);
                out.put_slice(&prefix.octets());
                out.put_u32(asn);
            }
            Pdu::EndOfData { version, session_id, serial, ref timers } => {
                match (version, timers) {
                    (0, _) => {
                        Header {
                            version, pdu_type: END_OF_DATA,
                            field: session_id, length: 12,
                        }.write(out);
                        out.put_u32(serial.0);
                    }
                    (_, Some(timers)) => {
                        Header {
                            version, pdu_type: END_OF_DATA,
                            field: session_id, length: 24,
                        }.write(out);
                        out.put_u32(serial.0);
                        out.put_u32(timers.refresh);
                        out.put_u32(timers.retry);
                        out.put_u32(timers.expire);
                    }
                    (_, None) => panic!(
                        "End of Data for version >= 1 requires timers"
                    ),
                }
            }
            Pdu::CacheReset { version } => {
                Header { version, pdu_type: CACHE_RESET, field: 0, length: 8 }
                    .write(out);
            }
            Pdu::RouterKey {
                version, announce, subject_key_identifier, asn,
                ref subject_public_key_info,
            } => {
                let length = 8 + 20 + 4 + subject_public_key_info.len() as u32;
                Header {
                    version, pdu_type: ROUTER_KEY,
                    field: u16::from(announce), length,
                }.write(out);
                out.put_slice(&subject_key_identifier);
                out.put_u32(asn);
                out.put_slice(subject_public_key_info);
            }
            Pdu::ErrorReport { version, error_code, ref erroneous_pdu, ref text } => {
                let text_bytes = text.as_bytes();
                let length = 8 + 4 + erroneous_pdu.len() as u32
                    + 4 + text_bytes.len() as u32;
                Header {
                    version, pdu_type: ERROR_REPORT,
                    field: error_code, length,
                }.write(out);
                out.put_u32(erroneous_pdu.len() as u32);
                out.put_slice(erroneous_pdu);
                out.put_u32(text_bytes.len() as u32);
                out.put_slice(text_bytes);
            }
        }
    }

    /// Serializes the PDU into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Parses a complete PDU (header plus body) from `buf`.
    ///
    /// `buf` must contain exactly `header.length` bytes, header
    /// included; callers are expected to have already read that many
    /// bytes off the wire based on the header.
    pub fn decode(header: Header, buf: &[u8]) -> Result<Self, PduError> {
        if header.length < HEADER_LEN as u32 {
            return Err(PduError::TooShort(header.length));
        }
        let body = &buf[HEADER_LEN..];
        let version = header.version;
        match header.pdu_type {
            SERIAL_NOTIFY => {
                expect_len(header, 12)?;
                Ok(Pdu::SerialNotify {
                    version, session_id: header.field,
                    serial: Serial::from(read_u32(body, 0)),
                })
            }
            SERIAL_QUERY => {
                expect_len(header, 12)?;
                Ok(Pdu::SerialQuery {
                    version, session_id: header.field,
                    serial: Serial::from(read_u32(body, 0)),
                })
            }
            RESET_QUERY => {
                expect_len(header, 8)?;
                Ok(Pdu::ResetQuery { version })
            }
            CACHE_RESPONSE => {
                expect_len(header, 8)?;
                Ok(Pdu::CacheResponse { version, session_id: header.field })
            }
            IPV4_PREFIX => {
                expect_len(header, 20)?;
                Ok(Pdu::Ipv4Prefix {
                    version,
                    announce: body[0] != 0,
                    prefix_len: body[1],
                    max_len: body[2],
                    prefix: Ipv4Addr::new(body[4], body[5], body[6], body[7]),
                    asn: read_u32(body, 8),
                })
            }
            IPV6_PREFIX => {
                expect_len(header, 32)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&body[4..20]);
                Ok(Pdu::Ipv6Prefix {
                    version,
                    announce: body[0] != 0,
                    prefix_len: body[1],
                    max_len: body[2],
                    prefix: Ipv6Addr::from(octets),
                    asn: read_u32(body, 20),
                })
            }
            END_OF_DATA => {
                if version == 0 {
                    expect_len(header, 12)?;
                    Ok(Pdu::EndOfData {
                        version, session_id: header.field,
                        serial: Serial::from(read_u32(body, 0)),
                        timers: None,
                    })
                }
                else {
                    expect_len(header, 24)?;
                    Ok(Pdu::EndOfData {
                        version, session_id: header.field,
                        serial: Serial::from(read_u32(body, 0)),
                        timers: Some(Timers {
                            refresh: read_u32(body, 4),
                            retry: read_u32(body, 8),
                            expire: read_u32(body, 12),
                        }),
                    })
                }
            }
            CACHE_RESET => {
                expect_len(header, 8)?;
                Ok(Pdu::CacheReset { version })
            }
            ROUTER_KEY => {
                if header.length < 8 + 20 + 4 {
                    return Err(PduError::BadLength {
                        pdu_type: ROUTER_KEY,
                        expected: 8 + 20 + 4,
                        actual: header.length,
                    });
                }
                let mut ski = [0u8; 20];
                ski.copy_from_slice(&body[0..20]);
                Ok(Pdu::RouterKey {
                    version,
                    announce: header.field != 0,
                    subject_key_identifier: ski,
                    asn: read_u32(body, 20),
                    subject_public_key_info: Bytes::copy_from_slice(&body[24..]),
                })
            }
            ERROR_REPORT => {
                if header.length < 8 + 4 + 4 {
                    return Err(PduError::BadLength {
                        pdu_type: ERROR_REPORT,
                        expected: 8 + 4 + 4,
                        actual: header.length,
                    });
                }
                let mut cursor = &body[..];
                let pdu_len = cursor.get_u32() as usize;
                if cursor.len() < pdu_len + 4 {
                    return Err(PduError::BadLength {
                        pdu_type: ERROR_REPORT,
                        expected: header.length,
                        actual: header.length,
                    });
                }
                let erroneous_pdu = Bytes::copy_from_slice(&cursor[..pdu_len]);
                cursor.advance(pdu_len);
                let text_len = cursor.get_u32() as usize;
                if cursor.len() < text_len {
                    return Err(PduError::BadLength {
                        pdu_type: ERROR_REPORT,
                        expected: header.length,
                        actual: header.length,
                    });
                }
                let text = String::from_utf8_lossy(&cursor[..text_len]).into_owned();
                Ok(Pdu::ErrorReport {
                    version,
                    error_code: header.field,
                    erroneous_pdu,
                    text,
                })
            }
            other => Err(PduError::UnknownType(other)),
        }
    }
}

fn expect_len(header: Header, expected: u32) -> Result<(), PduError> {
    if header.length != expected {
        Err(PduError::BadLength {
            pdu_type: header.pdu_type, expected, actual: header.length,
        })
    }
    else {
        Ok(())
    }
}

fn read_u32(body: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        body[offset], body[offset + 1], body[offset + 2], body[offset + 3],
    ])
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryInto;

    fn header_of(bytes: &[u8]) -> Header {
        let mut buf = [0u8; HEADER_LEN];
        buf.copy_from_slice(&bytes[..HEADER_LEN]);
        Header::parse(&buf)
    }

    fn round_trip(pdu: &Pdu) {
        let bytes = pdu.to_bytes();
        let header = header_of(&bytes);
        let parsed = Pdu::decode(header, &bytes).expect("decode failed");
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn reset_query_round_trips() {
        round_trip(&Pdu::ResetQuery { version: 1 });
    }

    #[test]
    fn serial_query_round_trips() {
        round_trip(&Pdu::SerialQuery {
            version: 1, session_id: 0x1234, serial: Serial::from(7),
        });
    }

    #[test]
    fn ipv4_prefix_round_trips() {
        round_trip(&Pdu::Ipv4Prefix {
            version: 0,
            announce: true,
            prefix_len: 24,
            max_len: 24,
            prefix: Ipv4Addr::new(192, 0, 2, 0),
            asn: 64512,
        });
    }

    #[test]
    fn ipv4_prefix_matches_scenario_bytes() {
        let pdu = Pdu::Ipv4Prefix {
            version: 1,
            announce: true,
            prefix_len: 24,
            max_len: 24,
            prefix: Ipv4Addr::new(192, 0, 2, 0),
            asn: 64512,
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes[8], 1); // flag: announce
        assert_eq!(bytes[9], 24); // prefix length
        assert_eq!(bytes[10], 24); // max length
        assert_eq!(&bytes[12..16], &[0xC0, 0x00, 0x02, 0x00]);
        assert_eq!(u32::from_be_bytes(bytes[16..20].try_into().unwrap()), 64512);
    }

    #[test]
    fn end_of_data_v0_has_no_timers() {
        round_trip(&Pdu::EndOfData {
            version: 0, session_id: 1, serial: Serial::from(1), timers: None,
        });
    }

    #[test]
    fn end_of_data_v1_carries_timers() {
        round_trip(&Pdu::EndOfData {
            version: 1, session_id: 1, serial: Serial::from(1),
            timers: Some(Timers { refresh: 3600, retry: 600, expire: 7200 }),
        });
    }

    #[test]
    fn router_key_round_trips() {
        round_trip(&Pdu::RouterKey {
            version: 1,
            announce: true,
            subject_key_identifier: [7u8; 20],
            asn: 64512,
            subject_public_key_info: Bytes::from_static(b"spki-bytes"),
        });
    }

    #[test]
    fn error_report_round_trips_with_empty_fields() {
        round_trip(&Pdu::ErrorReport {
            version: 1, error_code: 2,
            erroneous_pdu: Bytes::new(), text: String::new(),
        });
    }

    #[test]
    fn error_report_round_trips_with_payload() {
        round_trip(&Pdu::ErrorReport {
            version: 1, error_code: 0,
            erroneous_pdu: Bytes::from_static(b"\x01\x02\x00\x00\x00\x00\x00\x08"),
            text: "session mismatch".into(),
        });
    }

    #[test]
    fn bad_length_is_rejected() {
        let pdu = Pdu::ResetQuery { version: 1 };
        let mut bytes = pdu.to_bytes().to_vec();
        // Corrupt the length field to claim 9 bytes.
        bytes[7] = 9;
        let header = header_of(&bytes);
        assert!(matches!(
            Pdu::decode(header, &bytes),
            Err(PduError::BadLength { .. })
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut bytes = BytesMut::new();
        Header { version: 1, pdu_type: 200, field: 0, length: 8 }.write(&mut bytes);
        let header = header_of(&bytes);
        assert!(matches!(
            Pdu::decode(header, &bytes),
            Err(PduError::UnknownType(200))
        ));
    }
}
