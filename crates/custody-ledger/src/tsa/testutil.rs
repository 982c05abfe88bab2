//! Synthetic RFC 3161 responses for tests.
//!
//! Shapes mirror the real wire layout (TimeStampResp → ContentInfo →
//! SignedData → encapContentInfo → TSTInfo) minus the signature material,
//! which this client deliberately does not validate.

use super::der::{
    context0, integer_u64, octet_string, oid, sequence, OID_SHA256, OID_TST_INFO,
    TAG_GENERALIZED_TIME, TAG_NULL,
};
use chrono::{DateTime, Utc};

/// id-signedData: 1.2.840.113549.1.7.2 (content bytes)
const OID_SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

/// Policy OID used by the fake TSA: 1.2.3.4
const TEST_POLICY: &[u8] = &[0x2a, 0x03, 0x04];
pub(crate) const TEST_POLICY_DOTTED: &str = "1.2.3.4";

fn generalized_time(t: DateTime<Utc>) -> Vec<u8> {
    let formatted = t.format("%Y%m%d%H%M%SZ").to_string();
    super::der::tlv(TAG_GENERALIZED_TIME, formatted.as_bytes())
}

fn tst_info(imprint: &[u8; 32], serial: u64, gen_time: DateTime<Utc>) -> Vec<u8> {
    let mut algorithm = oid(OID_SHA256);
    algorithm.extend_from_slice(&super::der::tlv(TAG_NULL, &[]));

    let mut imprint_seq = sequence(&algorithm);
    imprint_seq.extend_from_slice(&octet_string(imprint));

    let mut body = integer_u64(1);
    body.extend_from_slice(&oid(TEST_POLICY));
    body.extend_from_slice(&sequence(&imprint_seq));
    body.extend_from_slice(&integer_u64(serial));
    body.extend_from_slice(&generalized_time(gen_time));
    sequence(&body)
}

/// Timestamp token: ContentInfo(signedData, [0] SignedData(version,
/// encapContentInfo(id-ct-TSTInfo, [0] OCTET STRING(TSTInfo)))).
pub(crate) fn token(imprint: &[u8; 32], serial: u64, gen_time: DateTime<Utc>) -> Vec<u8> {
    let mut encap = oid(OID_TST_INFO);
    encap.extend_from_slice(&context0(&octet_string(&tst_info(imprint, serial, gen_time))));

    let mut signed_data = integer_u64(3);
    signed_data.extend_from_slice(&sequence(&encap));

    let mut content_info = oid(OID_SIGNED_DATA);
    content_info.extend_from_slice(&context0(&sequence(&signed_data)));
    sequence(&content_info)
}

/// `TimeStampResp` with PKIStatus granted(0) and a token.
pub(crate) fn granted_response(
    imprint: &[u8; 32],
    serial: u64,
    gen_time: DateTime<Utc>,
) -> Vec<u8> {
    let mut body = sequence(&integer_u64(0));
    body.extend_from_slice(&token(imprint, serial, gen_time));
    sequence(&body)
}

/// `TimeStampResp` with PKIStatus rejection(2) and no token.
pub(crate) fn rejected_response() -> Vec<u8> {
    sequence(&sequence(&integer_u64(2)))
}
