use rand::Rng;

const TOKEN_BYTES: usize = 16;

/// Generate a fresh fencing token: 128 random bits, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    const_hex::encode(bytes)
}
