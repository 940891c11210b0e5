//! Random password generation and a simple strength heuristic.

use rand::Rng;
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

use crate::error::VaultError;

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;

/// Characters counted as "special" by [`check_password_strength`].
const STRENGTH_SPECIALS: &str = r#"!@#$%^&*(),.?":{}|<>"#;

/// Minimum length below which a password is always weak.
pub const MIN_STRONG_LEN: usize = 8;

/// Which character classes a generated password draws from. Lowercase
/// letters are always included.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub digits: bool,
    pub uppercase: bool,
    pub special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            digits: true,
            uppercase: true,
            special: true,
        }
    }
}

/// Generates `length` characters drawn uniformly from the policy's pool
/// using the OS random generator.
pub fn generate_password(
    length: usize,
    policy: PasswordPolicy,
) -> Result<Zeroizing<String>, VaultError> {
    if length < 1 {
        return Err(VaultError::InvalidInput(
            "password length must be at least 1".into(),
        ));
    }

    let mut pool = String::from(LOWERCASE);
    if policy.digits {
        pool.push_str(DIGITS);
    }
    if policy.uppercase {
        pool.push_str(UPPERCASE);
    }
    if policy.special {
        pool.push_str(PUNCTUATION);
    }
    let pool = pool.as_bytes();

    let password: String = (0..length)
        .map(|_| pool[OsRng.gen_range(0..pool.len())] as char)
        .collect();
    Ok(Zeroizing::new(password))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strength::Weak => write!(f, "Weak"),
            Strength::Moderate => write!(f, "Moderate"),
            Strength::Strong => write!(f, "Strong"),
        }
    }
}

/// Rates a password: all four character classes is strong, any two is
/// moderate, anything shorter than [`MIN_STRONG_LEN`] is weak.
pub fn check_password_strength(password: &str) -> Strength {
    if password.chars().count() < MIN_STRONG_LEN {
        return Strength::Weak;
    }

    let classes = [
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| STRENGTH_SPECIALS.contains(c)),
    ];

    match classes.iter().filter(|&&present| present).count() {
        4 => Strength::Strong,
        2 | 3 => Strength::Moderate,
        _ => Strength::Weak,
    }
}
