//! Network-name parsing for the adapter boundary.

use bitcoin::Network;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("unknown network: {0}")]
    Unknown(String),
}

/// Map a case-insensitive network name to its parameters.
///
/// `simnet` is accepted for compatibility with btcd-derived tooling and maps
/// to signet, the closest network rust-bitcoin knows.
pub fn parse_network(name: &str) -> Result<Network, NetworkError> {
    match name.to_ascii_lowercase().as_str() {
        "mainnet" => Ok(Network::Bitcoin),
        "testnet" | "testnet3" => Ok(Network::Testnet),
        "signet" | "simnet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        _ => Err(NetworkError::Unknown(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_parse_case_insensitively() {
        assert_eq!(parse_network("mainnet").unwrap(), Network::Bitcoin);
        assert_eq!(parse_network("MainNet").unwrap(), Network::Bitcoin);
        assert_eq!(parse_network("testnet").unwrap(), Network::Testnet);
        assert_eq!(parse_network("testnet3").unwrap(), Network::Testnet);
        assert_eq!(parse_network("simnet").unwrap(), Network::Signet);
        assert_eq!(parse_network("signet").unwrap(), Network::Signet);
        assert_eq!(parse_network("REGTEST").unwrap(), Network::Regtest);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = parse_network("florinet").unwrap_err();
        assert!(err.to_string().contains("florinet"));
    }
}
