//! Minimal DER encoding/decoding for the RFC 3161 client.
//!
//! Scope is deliberately narrow: encode a `TimeStampReq`, read the status out
//! of a `TimeStampResp`, and extract the few TSTInfo fields the ledger
//! records (policy OID, serial, genTime, message imprint). This is a wire
//! client of the TSA protocol, not an ASN.1 stack, and CMS signature
//! validation is out of scope — the token is preserved verbatim for any
//! downstream validator that wants the full cryptographic story.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// DER parse/encode failures. Always fails closed — a token we cannot read
/// is recorded as a protocol error, never half-parsed.
#[derive(Debug, Error)]
pub enum DerError {
    #[error("der: input truncated")]
    Truncated,
    #[error("der: unsupported or invalid length encoding")]
    BadLength,
    #[error("der: expected tag {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("der: malformed OID")]
    BadOid,
    #[error("der: malformed GeneralizedTime '{0}'")]
    BadTime(String),
    #[error("timestamp token contains no TSTInfo")]
    MissingTstInfo,
}

// Universal tags used by the RFC 3161 shapes
pub(crate) const TAG_BOOLEAN: u8 = 0x01;
pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_NULL: u8 = 0x05;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_GENERALIZED_TIME: u8 = 0x18;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;
pub(crate) const TAG_CONTEXT_0: u8 = 0xa0;

/// id-sha256: 2.16.840.1.101.3.4.2.1 (content bytes)
pub(crate) const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
/// id-ct-TSTInfo: 1.2.840.113549.1.9.16.1.4 (content bytes)
pub(crate) const OID_TST_INFO: &[u8] = &[
    0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x10, 0x01, 0x04,
];

// ---- encoding ----

pub(crate) fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        let significant = &bytes[first..];
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
    out.extend_from_slice(content);
    out
}

pub(crate) fn sequence(content: &[u8]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, content)
}

pub(crate) fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(TAG_OCTET_STRING, content)
}

pub(crate) fn oid(content: &[u8]) -> Vec<u8> {
    tlv(TAG_OID, content)
}

pub(crate) fn boolean(value: bool) -> Vec<u8> {
    tlv(TAG_BOOLEAN, &[if value { 0xff } else { 0x00 }])
}

pub(crate) fn context0(content: &[u8]) -> Vec<u8> {
    tlv(TAG_CONTEXT_0, content)
}

/// Minimal positive INTEGER from a u64 (leading 0x00 pad when the high bit
/// is set, as DER requires).
pub(crate) fn integer_u64(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let mut content = bytes[first..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0x00);
    }
    tlv(TAG_INTEGER, &content)
}

/// DER `TimeStampReq` over a SHA-256 message imprint.
///
/// ```text
/// TimeStampReq ::= SEQUENCE {
///   version        INTEGER 1,
///   messageImprint SEQUENCE { AlgorithmIdentifier(sha256), OCTET STRING },
///   nonce          INTEGER,
///   certReq        BOOLEAN TRUE }
/// ```
pub fn encode_timestamp_req(imprint: &[u8; 32], nonce: u64) -> Vec<u8> {
    let mut alg = oid(OID_SHA256);
    alg.extend_from_slice(&tlv(TAG_NULL, &[]));
    let algorithm = sequence(&alg);

    let mut imprint_seq = algorithm;
    imprint_seq.extend_from_slice(&octet_string(imprint));
    let message_imprint = sequence(&imprint_seq);

    let mut body = integer_u64(1);
    body.extend_from_slice(&message_imprint);
    body.extend_from_slice(&integer_u64(nonce));
    body.extend_from_slice(&boolean(true));
    sequence(&body)
}

// ---- decoding ----

/// One tag-length-value element.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tlv<'a> {
    pub tag: u8,
    /// Full element, header included
    pub raw: &'a [u8],
    /// Value bytes only
    pub content: &'a [u8],
}

impl Tlv<'_> {
    pub fn is_constructed(&self) -> bool {
        self.tag & 0x20 != 0
    }
}

/// Sequential TLV reader over a byte slice.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn read(&mut self) -> Result<Tlv<'a>, DerError> {
        let start = self.pos;
        let tag = *self.data.get(self.pos).ok_or(DerError::Truncated)?;
        self.pos += 1;
        let first = *self.data.get(self.pos).ok_or(DerError::Truncated)?;
        self.pos += 1;

        let len = if first < 0x80 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;
            // Indefinite lengths (0x80) are BER, not DER
            if n == 0 || n > std::mem::size_of::<usize>() {
                return Err(DerError::BadLength);
            }
            let bytes = self
                .data
                .get(self.pos..self.pos + n)
                .ok_or(DerError::Truncated)?;
            self.pos += n;
            bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
        };

        // `len` comes off the wire; the addition itself must not overflow
        let end = self.pos.checked_add(len).ok_or(DerError::Truncated)?;
        let content = self.data.get(self.pos..end).ok_or(DerError::Truncated)?;
        self.pos = end;
        Ok(Tlv {
            tag,
            raw: &self.data[start..self.pos],
            content,
        })
    }

    pub fn expect(&mut self, tag: u8) -> Result<Tlv<'a>, DerError> {
        let tlv = self.read()?;
        if tlv.tag != tag {
            return Err(DerError::UnexpectedTag {
                expected: tag,
                found: tlv.tag,
            });
        }
        Ok(tlv)
    }
}

/// Parsed `TimeStampResp` envelope.
#[derive(Debug)]
pub(crate) struct TimestampResp {
    /// PKIStatus: 0 granted, 1 grantedWithMods, 2+ rejection
    pub status: u64,
    /// Raw timestamp token (CMS ContentInfo), header included
    pub token: Option<Vec<u8>>,
}

/// Read `TimeStampResp ::= SEQUENCE { status PKIStatusInfo, timeStampToken? }`.
pub(crate) fn parse_timestamp_resp(bytes: &[u8]) -> Result<TimestampResp, DerError> {
    let mut outer = Reader::new(bytes);
    let resp = outer.expect(TAG_SEQUENCE)?;

    let mut fields = Reader::new(resp.content);
    let status_info = fields.expect(TAG_SEQUENCE)?;
    let mut status_fields = Reader::new(status_info.content);
    let status_int = status_fields.expect(TAG_INTEGER)?;
    let status = status_int
        .content
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64);

    let token = if fields.is_empty() {
        None
    } else {
        Some(fields.expect(TAG_SEQUENCE)?.raw.to_vec())
    };

    Ok(TimestampResp { status, token })
}

/// TSTInfo fields the ledger records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    pub policy_oid: String,
    /// hashedMessage from the token's messageImprint
    pub message_imprint: Vec<u8>,
    /// TSA-assigned serial number, hex
    pub serial_hex: String,
    pub gen_time: DateTime<Utc>,
}

/// Best-effort TSTInfo extraction from a timestamp token.
///
/// Walks the CMS structure looking for the id-ct-TSTInfo content type and the
/// `[0]`-wrapped OCTET STRING that follows it (the eContent), then parses
/// that as TSTInfo. Signature structures around it are ignored on purpose.
pub fn extract_tst_info(token: &[u8]) -> Result<TstInfo, DerError> {
    let econtent = find_tst_econtent(token)?.ok_or(DerError::MissingTstInfo)?;
    parse_tst_info(econtent)
}

fn find_tst_econtent(data: &[u8]) -> Result<Option<&[u8]>, DerError> {
    let mut reader = Reader::new(data);
    let mut saw_tst_oid = false;
    while !reader.is_empty() {
        let tlv = reader.read()?;
        if tlv.tag == TAG_OID && tlv.content == OID_TST_INFO {
            saw_tst_oid = true;
            continue;
        }
        if saw_tst_oid && tlv.tag == TAG_CONTEXT_0 {
            let mut inner = Reader::new(tlv.content);
            let octets = inner.expect(TAG_OCTET_STRING)?;
            return Ok(Some(octets.content));
        }
        if tlv.is_constructed() {
            if let Some(found) = find_tst_econtent(tlv.content)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

/// Parse the leading TSTInfo fields:
/// `SEQUENCE { version, policy OID, messageImprint, serialNumber, genTime, ... }`.
fn parse_tst_info(data: &[u8]) -> Result<TstInfo, DerError> {
    let mut outer = Reader::new(data);
    let info = outer.expect(TAG_SEQUENCE)?;
    let mut fields = Reader::new(info.content);

    let _version = fields.expect(TAG_INTEGER)?;
    let policy = fields.expect(TAG_OID)?;
    let imprint_seq = fields.expect(TAG_SEQUENCE)?;
    let serial = fields.expect(TAG_INTEGER)?;
    let gen_time = fields.expect(TAG_GENERALIZED_TIME)?;

    let mut imprint_fields = Reader::new(imprint_seq.content);
    let _algorithm = imprint_fields.expect(TAG_SEQUENCE)?;
    let hashed_message = imprint_fields.expect(TAG_OCTET_STRING)?;

    Ok(TstInfo {
        policy_oid: decode_oid(policy.content)?,
        message_imprint: hashed_message.content.to_vec(),
        serial_hex: hex::encode(serial.content),
        gen_time: parse_generalized_time(gen_time.content)?,
    })
}

fn decode_oid(content: &[u8]) -> Result<String, DerError> {
    if content.is_empty() {
        return Err(DerError::BadOid);
    }
    let mut parts = vec![
        (content[0] / 40) as u64,
        (content[0] % 40) as u64,
    ];
    let mut acc: u64 = 0;
    let mut mid_arc = false;
    for b in &content[1..] {
        acc = (acc << 7) | (*b & 0x7f) as u64;
        mid_arc = *b & 0x80 != 0;
        if !mid_arc {
            parts.push(acc);
            acc = 0;
        }
    }
    if mid_arc {
        return Err(DerError::BadOid);
    }
    Ok(parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("."))
}

/// GeneralizedTime: `YYYYMMDDHHMMSS[.f...]Z` (RFC 3161 requires UTC/Z form).
fn parse_generalized_time(content: &[u8]) -> Result<DateTime<Utc>, DerError> {
    let s = std::str::from_utf8(content).map_err(|_| DerError::BadTime(hex::encode(content)))?;
    let bad = || DerError::BadTime(s.to_string());
    let trimmed = s.strip_suffix('Z').ok_or_else(bad)?;
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S"))
        .map_err(|_| bad())?;
    Ok(naive.and_utc())
}
