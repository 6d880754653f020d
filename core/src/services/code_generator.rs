//! Cryptographically secure code generation

use rand::{rngs::OsRng, Rng};

use otp_shared::config::otp::{MAX_CODE_LENGTH, MIN_CODE_LENGTH};
use otp_shared::config::{AlphabetKind, OtpConfig};

use crate::errors::{DomainError, DomainResult};

const DIGITS: &str = "0123456789";
// Upper-case letters and digits without 0, O, 1 and I
const UNAMBIGUOUS: &str = "23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Character set codes are drawn from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alphabet {
    Numeric,
    Alphanumeric,
    Custom(String),
}

impl Alphabet {
    /// Builds the alphabet selected in configuration
    pub fn from_config(config: &OtpConfig) -> DomainResult<Self> {
        match config.alphabet {
            AlphabetKind::Numeric => Ok(Alphabet::Numeric),
            AlphabetKind::Alphanumeric => Ok(Alphabet::Alphanumeric),
            AlphabetKind::Custom => {
                let chars = config.custom_alphabet.clone().unwrap_or_default();
                let alphabet = Alphabet::Custom(chars);
                alphabet.symbols()?;
                Ok(alphabet)
            }
        }
    }

    /// Distinct symbols, in first-seen order
    fn symbols(&self) -> DomainResult<Vec<char>> {
        let source = match self {
            Alphabet::Numeric => DIGITS,
            Alphabet::Alphanumeric => UNAMBIGUOUS,
            Alphabet::Custom(chars) => chars.as_str(),
        };

        let mut symbols: Vec<char> = Vec::with_capacity(source.len());
        for c in source.chars() {
            if !symbols.contains(&c) {
                symbols.push(c);
            }
        }

        if symbols.len() < 2 {
            return Err(DomainError::invalid(
                "alphabet",
                "alphabet needs at least 2 distinct characters",
            ));
        }
        Ok(symbols)
    }
}

/// Generates one-time codes from the OS CSPRNG
pub struct CodeGenerator;

impl CodeGenerator {
    /// Draws `length` symbols uniformly from `alphabet`.
    ///
    /// `gen_range` rejection-samples, so every symbol is equally likely.
    pub fn generate(length: usize, alphabet: &Alphabet) -> DomainResult<String> {
        if length < MIN_CODE_LENGTH {
            return Err(DomainError::invalid(
                "code_length",
                format!("must be at least {}", MIN_CODE_LENGTH),
            ));
        }
        if length > MAX_CODE_LENGTH {
            return Err(DomainError::invalid(
                "code_length",
                format!("must be at most {}", MAX_CODE_LENGTH),
            ));
        }

        let symbols = alphabet.symbols()?;
        let mut rng = OsRng;
        Ok((0..length)
            .map(|_| symbols[rng.gen_range(0..symbols.len())])
            .collect())
    }
}
