//! Per-connection RTR protocol handling.
//!
//! Each accepted TCP connection is served on its own thread for its
//! entire lifetime: read a PDU, dispatch it, write a response, repeat
//! until the client disconnects, a timeout fires, or a fatal protocol
//! error forces the connection closed.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use crate::payload::{OwnedItem, DeltaStatus, Prefix, VrpStore};
use crate::rtr::pdu::{Header, Pdu, PduError, Timers, HEADER_LEN};
use crate::rtr::serial::Serial;


//------------ ConnConfig ------------------------------------------------------

/// Per-connection settings derived from the process configuration.
#[derive(Clone, Copy, Debug)]
pub struct ConnConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

/// RFC 8210 §10 (as extended by RFC 9255) error codes that require the
/// connection to be closed once reported.
fn is_fatal(code: u16) -> bool {
    matches!(code, 0 | 1 | 3 | 4 | 5 | 6 | 7 | 8)
}


//------------ handle_connection -----------------------------------------------

/// Serves a single accepted connection until it closes.
pub fn handle_connection(
    mut stream: TcpStream, store: Arc<VrpStore>, config: ConnConfig,
) {
    let peer = stream.peer_addr().ok();
    if let Err(err) = stream.set_read_timeout(Some(config.read_timeout)) {
        warn!("RTR: failed to set read timeout: {}", err);
    }
    if let Err(err) = stream.set_write_timeout(Some(config.write_timeout)) {
        warn!("RTR: failed to set write timeout: {}", err);
    }

    let mut conn_version = None;
    loop {
        let (header, buf) = match read_pdu(&mut stream) {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!("RTR: connection from {:?} closed by peer", peer);
                return;
            }
            Err(_) => {
                // Timed out or errored: the peer is presumed gone, per
                // the read/write timeout policy. No Error Report is
                // sent.
                return;
            }
        };
        match dispatch(&mut stream, &store, &config, &mut conn_version, header, buf) {
            Outcome::Continue => { }
            Outcome::Close => {
                debug!("RTR: closing connection from {:?}", peer);
                return;
            }
        }
    }
}

enum Outcome {
    Continue,
    Close,
}

/// Reads one complete PDU (header and body) off the socket.
///
/// Returns `Ok(None)` on a clean EOF before any byte of a new PDU is
/// read. An `Err` covers timeouts and any other I/O error, all of
/// which the caller treats identically: close without responding.
fn read_pdu(stream: &mut TcpStream) -> io::Result<Option<(Header, Vec<u8>)>> {
    let mut header_buf = [0u8; HEADER_LEN];
    if !read_exact_or_eof(stream, &mut header_buf)? {
        return Ok(None);
    }
    let header = Header::parse(&header_buf);
    let mut full = Vec::with_capacity(header.length.max(HEADER_LEN as u32) as usize);
    full.extend_from_slice(&header_buf);
    if header.length as usize > HEADER_LEN {
        let mut rest = vec![0u8; header.length as usize - HEADER_LEN];
        stream.read_exact(&mut rest)?;
        full.extend_from_slice(&rest);
    }
    Ok(Some((header, full)))
}

/// Like `Read::read_exact`, but a zero-byte read before anything has
/// been read is reported as a clean `Ok(false)` rather than an error.
fn read_exact_or_eof(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match stream.read(&mut buf[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof, "connection closed mid-PDU"
                ));
            }
            Ok(n) => read += n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => { }
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}

fn dispatch(
    stream: &mut TcpStream,
    store: &VrpStore,
    config: &ConnConfig,
    conn_version: &mut Option<u8>,
    header: Header,
    buf: Vec<u8>,
) -> Outcome {
    match *conn_version {
        Some(version) if version != header.version => {
            return send_error(
                stream, version, 5, &buf,
                "protocol version switched during connection",
            );
        }
        Some(_) => { }
        None => {
            if header.version > 1 {
                return send_error(
                    stream, header.version, 4, &buf,
                    "only protocol versions 0 and 1 are supported",
                );
            }
            *conn_version = Some(header.version);
        }
    }
    let version = header.version;

    match Pdu::decode(header, &buf) {
        Err(PduError::TooShort(_)) | Err(PduError::BadLength { .. }) => {
            send_error(stream, version, 0, &buf, "malformed PDU")
        }
        Err(PduError::UnknownType(_)) => {
            send_error(stream, version, 3, &buf, "unsupported PDU type")
        }
        Ok(pdu) => handle_pdu(stream, store, config, version, pdu),
    }
}

fn handle_pdu(
    stream: &mut TcpStream,
    store: &VrpStore,
    config: &ConnConfig,
    version: u8,
    pdu: Pdu,
) -> Outcome {
    match pdu {
        Pdu::SerialQuery { session_id, serial, .. } => {
            handle_serial_query(stream, store, config, version, session_id, serial)
        }
        Pdu::ResetQuery { .. } => {
            handle_reset_query(stream, store, config, version)
        }
        Pdu::ErrorReport { error_code, text, .. } => {
            warn!("RTR: client sent Error Report {}: {}", error_code, text);
            if is_fatal(error_code) { Outcome::Close } else { Outcome::Continue }
        }
        other => {
            warn!(
                "RTR: client sent unexpected server-originated PDU type {}",
                other.pdu_type()
            );
            let bytes = other.to_bytes();
            send_error(stream, version, 3, &bytes, "unexpected PDU type")
        }
    }
}

fn handle_serial_query(
    stream: &mut TcpStream,
    store: &VrpStore,
    config: &ConnConfig,
    version: u8,
    session_id: u16,
    serial: Serial,
) -> Outcome {
    if session_id != store.session_id(version) {
        let pdu = Pdu::SerialQuery { version, session_id, serial };
        return send_error(
            stream, version, 0, &pdu.to_bytes(), "session id mismatch",
        );
    }
    match store.delta_status(Some(serial)) {
        DeltaStatus::NoDataAvailable => {
            send_error(stream, version, 2, &[], "no data available")
        }
        // Delta composition is fully implemented and tested in the VRP
        // Store, but until it has seen more production mileage we fall
        // back to the same conservative Cache Reset response that
        // DiffUndetermined gets.
        DeltaStatus::DiffUndetermined | DeltaStatus::DiffAvailable => {
            send_simple(stream, Pdu::CacheReset { version })
        }
        DeltaStatus::NoDiff => {
            send_response(
                stream, store, config, version, store.session_id(version),
                store.current_serial(), Vec::new(),
            )
        }
    }
}

fn handle_reset_query(
    stream: &mut TcpStream,
    store: &VrpStore,
    config: &ConnConfig,
    version: u8,
) -> Outcome {
    match store.delta_status(None) {
        DeltaStatus::NoDataAvailable => {
            send_error(stream, version, 2, &[], "no data available")
        }
        _ => {
            let items = store.snapshot_iter(version);
            send_response(
                stream, store, config, version, store.session_id(version),
                store.current_serial(), items,
            )
        }
    }
}

/// Writes Cache Response, the given payload items, then End of Data.
fn send_response(
    stream: &mut TcpStream,
    _store: &VrpStore,
    config: &ConnConfig,
    version: u8,
    session_id: u16,
    serial: Serial,
    items: Vec<OwnedItem>,
) -> Outcome {
    let mut buf = BytesMut::new();
    Pdu::CacheResponse { version, session_id }.write(&mut buf);
    if write_and_clear(stream, &mut buf).is_err() {
        return Outcome::Close;
    }
    for item in items {
        let pdu = match item {
            OwnedItem::Vrp(vrp, announce) => Some(match vrp.prefix {
                Prefix::V4(addr, prefix_len) => Pdu::Ipv4Prefix {
                    version, announce, prefix_len,
                    max_len: vrp.max_length, prefix: addr, asn: vrp.asn,
                },
                Prefix::V6(addr, prefix_len) => Pdu::Ipv6Prefix {
                    version, announce, prefix_len,
                    max_len: vrp.max_length, prefix: addr, asn: vrp.asn,
                },
            }),
            OwnedItem::RouterKey(key, announce) => {
                // Silently skipped for version 0: router keys are a
                // version-1 extension.
                if version >= 1 {
                    Some(Pdu::RouterKey {
                        version, announce,
                        subject_key_identifier: key.subject_key_identifier,
                        asn: key.asn,
                        subject_public_key_info: key.subject_public_key_info,
                    })
                }
                else {
                    None
                }
            }
        };
        if let Some(pdu) = pdu {
            pdu.write(&mut buf);
            if write_and_clear(stream, &mut buf).is_err() {
                return Outcome::Close;
            }
        }
    }
    let timers = if version >= 1 {
        Some(Timers { refresh: config.refresh, retry: config.retry, expire: config.expire })
    }
    else {
        None
    };
    Pdu::EndOfData { version, session_id, serial, timers }.write(&mut buf);
    match write_and_clear(stream, &mut buf) {
        Ok(()) => Outcome::Continue,
        Err(_) => Outcome::Close,
    }
}

fn send_simple(stream: &mut TcpStream, pdu: Pdu) -> Outcome {
    let bytes = pdu.to_bytes();
    match stream.write_all(&bytes) {
        Ok(()) => Outcome::Continue,
        Err(_) => Outcome::Close,
    }
}

fn send_error(
    stream: &mut TcpStream, version: u8, code: u16, erroneous_pdu: &[u8], text: &str,
) -> Outcome {
    let pdu = Pdu::ErrorReport {
        version, error_code: code,
        erroneous_pdu: Bytes::copy_from_slice(erroneous_pdu),
        text: text.into(),
    };
    let bytes = pdu.to_bytes();
    if stream.write_all(&bytes).is_err() {
        return Outcome::Close;
    }
    if is_fatal(code) { Outcome::Close } else { Outcome::Continue }
}

fn write_and_clear(stream: &mut TcpStream, buf: &mut BytesMut) -> io::Result<()> {
    let result = stream.write_all(buf);
    buf.clear();
    result
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_codes_match_rfc8210_plus_rfc9255() {
        for code in [0u16, 1, 3, 4, 5, 6, 7, 8] {
            assert!(is_fatal(code), "expected {} to be fatal", code);
        }
        assert!(!is_fatal(2));
    }
}
