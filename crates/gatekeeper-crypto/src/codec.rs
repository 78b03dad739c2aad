use base64::engine::{general_purpose::URL_SAFE, general_purpose::URL_SAFE_NO_PAD, Engine as _};
use gatekeeper_core::{GatekeeperError, TokenId};

/// Canonical encoding is unpadded URL-safe base64 (DESIGN.md Open Question
/// #1, grounded on the original's `shared/encryption.py::encode_url_safe`,
/// which strips `=` padding before embedding the token in a query string).
pub fn encode_token_id(token_id: &TokenId) -> String {
    URL_SAFE_NO_PAD.encode(token_id.as_bytes())
}

/// Decode accepts both the canonical unpadded form and a padded form, in
/// case a shortlink provider re-pads the query string in transit.
pub fn decode_token_id(encoded: &str) -> Result<TokenId, GatekeeperError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|_| GatekeeperError::Serialization(format!("malformed token encoding: {encoded}")))?;

    let arr: [u8; 16] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| GatekeeperError::Serialization(format!("wrong token length: {encoded}")))?;

    Ok(TokenId::from_bytes(arr))
}

/// Encode a `/start` deep-link payload (spec.md §6: `get-<post_no>` or
/// `verify-<token_id>`) as unpadded URL-safe base64, the form Telegram's
/// `t.me/<bot>?start=` query parameter carries.
pub fn encode_start_payload(payload: &str) -> String {
    URL_SAFE_NO_PAD.encode(payload.as_bytes())
}

/// Decode a `/start` payload, accepting both the canonical unpadded form
/// and a padded one (a `start=` value can be re-escaped in transit).
pub fn decode_start_payload(encoded: &str) -> Result<String, GatekeeperError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|_| GatekeeperError::Serialization(format!("malformed start payload: {encoded}")))?;

    String::from_utf8(bytes)
        .map_err(|_| GatekeeperError::Serialization(format!("start payload is not utf-8: {encoded}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_start_payload() {
        let encoded = encode_start_payload("get-42");
        assert!(!encoded.contains('='));
        assert_eq!(decode_start_payload(&encoded).unwrap(), "get-42");
    }

    #[test]
    fn round_trips_unpadded() {
        let id = TokenId::from_bytes([7u8; 16]);
        let encoded = encode_token_id(&id);
        assert!(!encoded.contains('='));
        assert_eq!(decode_token_id(&encoded).unwrap().as_bytes(), id.as_bytes());
    }

    #[test]
    fn accepts_padded_input() {
        let id = TokenId::from_bytes([9u8; 16]);
        let padded = URL_SAFE.encode(id.as_bytes());
        assert!(padded.contains('='));
        assert_eq!(decode_token_id(&padded).unwrap().as_bytes(), id.as_bytes());
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_token_id("not valid base64!!").is_err());
    }
}
