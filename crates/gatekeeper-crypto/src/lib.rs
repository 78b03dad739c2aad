pub mod codec;
pub mod token_id;

pub use codec::{decode_start_payload, decode_token_id, encode_start_payload, encode_token_id};
pub use token_id::mint_token_id;
