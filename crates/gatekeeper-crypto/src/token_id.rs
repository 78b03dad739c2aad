use gatekeeper_core::TokenId;
use rand::RngCore;

/// Mint a new token identifier: 128 bits from the OS CSPRNG (spec.md §3's
/// "≥128-bit entropy, opaque" requirement for `VerificationToken::token_id`).
pub fn mint_token_id() -> TokenId {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    TokenId::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_distinct_ids() {
        let a = mint_token_id();
        let b = mint_token_id();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
