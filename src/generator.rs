// src/generator.rs
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Deserialize;

const LOWERCASE_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NUMBER_CHARS: &[u8] = b"0123456789";
const SYMBOL_CHARS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

pub const MAX_LENGTH: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PasswordCriteria {
    pub length: usize,
    pub use_uppercase: bool,
    pub use_lowercase: bool,
    pub use_numbers: bool,
    pub use_symbols: bool,
}

impl Default for PasswordCriteria {
    fn default() -> Self {
        PasswordCriteria {
            length: 20,
            use_uppercase: true,
            use_lowercase: true,
            use_numbers: true,
            use_symbols: true,
        }
    }
}

impl PasswordCriteria {
    fn charsets(&self) -> Vec<&'static [u8]> {
        [
            (self.use_lowercase, LOWERCASE_CHARS),
            (self.use_uppercase, UPPERCASE_CHARS),
            (self.use_numbers, NUMBER_CHARS),
            (self.use_symbols, SYMBOL_CHARS),
        ]
        .into_iter()
        .filter_map(|(enabled, set)| enabled.then_some(set))
        .collect()
    }
}

/// Generates a random password. Each selected character class appears at
/// least once when the length allows it.
pub fn generate_password(criteria: &PasswordCriteria) -> Result<String, String> {
    if criteria.length == 0 {
        return Err("Password length cannot be zero.".to_string());
    }
    if criteria.length > MAX_LENGTH {
        return Err(format!("Password length cannot exceed {}.", MAX_LENGTH));
    }

    let charsets = criteria.charsets();
    if charsets.is_empty() {
        return Err("At least one character set (lowercase, uppercase, numbers, symbols) must be selected.".to_string());
    }
    let combined: Vec<u8> = charsets.concat();

    let mut rng = thread_rng();
    let mut password_bytes: Vec<u8> = charsets
        .iter()
        .take(criteria.length)
        .filter_map(|set| set.choose(&mut rng).copied())
        .collect();
    while password_bytes.len() < criteria.length {
        if let Some(&c) = combined.choose(&mut rng) {
            password_bytes.push(c);
        }
    }
    password_bytes.shuffle(&mut rng);

    String::from_utf8(password_bytes).map_err(|e| format!("Failed to convert password bytes to String: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(length: usize, lower: bool, upper: bool, numbers: bool, symbols: bool) -> PasswordCriteria {
        PasswordCriteria {
            length,
            use_lowercase: lower,
            use_uppercase: upper,
            use_numbers: numbers,
            use_symbols: symbols,
        }
    }

    #[test]
    fn test_generate_password_default_criteria() {
        let criteria = PasswordCriteria::default();
        let password = generate_password(&criteria).unwrap();
        assert_eq!(password.len(), criteria.length);
    }

    #[test]
    fn test_every_selected_class_is_present() {
        for _ in 0..20 {
            let password = generate_password(&only(4, true, true, true, true)).unwrap();
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(password.bytes().any(|c| SYMBOL_CHARS.contains(&c)));
        }
    }

    #[test]
    fn test_length_longer_than_charset() {
        let password = generate_password(&only(64, false, false, true, false)).unwrap();
        assert_eq!(password.len(), 64);
        assert!(password.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_short_length_with_many_classes() {
        let password = generate_password(&only(2, true, true, true, true)).unwrap();
        assert_eq!(password.len(), 2);
    }

    #[test]
    fn test_only_lowercase() {
        let password = generate_password(&only(10, true, false, false, false)).unwrap();
        assert!(password.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_invalid_criteria() {
        assert!(generate_password(&only(10, false, false, false, false)).is_err());
        assert!(generate_password(&only(0, true, true, true, true)).is_err());
        assert!(generate_password(&only(MAX_LENGTH + 1, true, true, true, true)).is_err());
    }

    #[test]
    fn test_generate_password_randomness() {
        let criteria = PasswordCriteria::default();
        assert_ne!(generate_password(&criteria).unwrap(), generate_password(&criteria).unwrap());
    }
}
