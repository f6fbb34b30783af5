//! Join code utilities.
//!
//! A circle carries a single short code that is used both to look the circle
//! up and to admit new members into it.

use rand::Rng;

/// Number of characters in a generated join code.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Alphabet join codes are drawn from (uppercase alphanumerics).
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

lazy_static::lazy_static! {
    /// Shape of a code produced by [`generate_join_code`].
    pub static ref JOIN_CODE_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Z0-9]{6}$").unwrap();
}

/// Generate a random join code using the thread-local generator.
///
/// No uniqueness check is performed here.
pub fn generate_join_code() -> String {
    generate_join_code_with(&mut rand::thread_rng())
}

/// Generate a join code from the given random source.
pub fn generate_join_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..JOIN_CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Normalise user-entered text into the stored code form (trimmed, uppercase).
///
/// Code lookup is case-sensitive, so callers run user input through this
/// before joining.
pub fn normalize_join_code(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Returns true if `code` has the shape of a generated join code.
pub fn is_well_formed(code: &str) -> bool {
    JOIN_CODE_REGEX.is_match(code)
}
