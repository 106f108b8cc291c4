use rand::Rng;

pub const SHORT_CODE_LEN: usize = 6;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random 6-character code from `A-Z0-9`.
pub fn generate() -> String {
    let mut rng = rand::rng();
    (0..SHORT_CODE_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == SHORT_CODE_LEN && code.bytes().all(|b| CHARSET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..200 {
            let code = generate();
            assert!(is_well_formed(&code), "bad code {code}");
        }
    }

    #[test]
    fn rejects_lowercase_and_wrong_length() {
        assert!(is_well_formed("AB12CD"));
        assert!(!is_well_formed("ab12cd"));
        assert!(!is_well_formed("AB12C"));
        assert!(!is_well_formed("AB12CDE"));
    }
}
