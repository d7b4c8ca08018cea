//! BIP-39 mnemonic handling.

use bip39::{Language, Mnemonic};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("mnemonic generation failed: {0}")]
    Generation(String),
}

/// Generate a fresh 24-word English mnemonic.
pub fn generate_mnemonic() -> Result<Mnemonic, SeedError> {
    Mnemonic::generate_in(Language::English, 24).map_err(|e| SeedError::Generation(e.to_string()))
}

/// Parse an English mnemonic phrase.
pub fn parse_mnemonic(words: &str) -> Result<Mnemonic, SeedError> {
    Mnemonic::parse_in(Language::English, words)
        .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))
}
