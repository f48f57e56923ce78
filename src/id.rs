use rand::{rngs::OsRng, RngCore};

use crate::{Error, Result};

const ID_ENTROPY_BYTES: usize = 32;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Session key generation routine that follows [OWASP recommendations].
///
/// 256 bits from the operating system randomness source, base32 encoded
/// without padding. There is no fallback generator: if the OS source fails
/// the error is returned.
///
/// [OWASP recommendations]: https://cheatsheetseries.owasp.org/cheatsheets/Session_Management_Cheat_Sheet.html#session-id-entropy
pub(crate) fn generate_session_id() -> Result<String> {
    let mut random_bytes = [0u8; ID_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut random_bytes)
        .map_err(Error::IdentifierGeneration)?;
    Ok(base32_encode(&random_bytes))
}

/// RFC 4648 base32 with the trailing `=` padding stripped.
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer = 0u16;
    let mut bits = 0u8;

    for &byte in data {
        buffer = (buffer << 8) | byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}
