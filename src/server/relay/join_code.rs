//! Join code generation and normalisation.

use rand::Rng;

use crate::config::relay::{JOIN_CODE_ALPHABET, JOIN_CODE_LEN};
use crate::server::types::JoinCode;

/// Draw a random join code from the readable alphabet.
pub fn generate<R: Rng>(rng: &mut R) -> JoinCode {
    (0..JOIN_CODE_LEN)
        .map(|_| JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are shared by humans; accept surrounding whitespace and lower case.
pub fn normalize(code: &str) -> JoinCode {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generated_codes_use_the_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate(&mut rng);
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize("  abc123\n"), "ABC123");
    }
}
