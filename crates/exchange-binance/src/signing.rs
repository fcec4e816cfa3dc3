use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// API key pair for signed endpoints.
///
/// Loaded from environment variables, never from config files.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    api_secret: String,
}

impl ApiCredentials {
    #[must_use]
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Loads credentials from `BINANCE_API_KEY` / `BINANCE_API_SECRET`.
    ///
    /// # Errors
    /// Returns an error if either variable is missing or empty.
    pub fn from_env() -> Result<Self> {
        let api_key =
            std::env::var("BINANCE_API_KEY").context("Missing BINANCE_API_KEY env var")?;
        let api_secret =
            std::env::var("BINANCE_API_SECRET").context("Missing BINANCE_API_SECRET env var")?;
        if api_key.is_empty() || api_secret.is_empty() {
            anyhow::bail!("Binance API credentials must not be empty");
        }
        Ok(Self {
            api_key,
            api_secret,
        })
    }

    /// HMAC-SHA256 signature over the canonical query string, hex-encoded.
    #[must_use]
    pub fn sign(&self, query_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_venue_documentation_vector() {
        // Worked example from the Binance signed-endpoint documentation.
        let credentials = ApiCredentials::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A".to_string(),
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".to_string(),
        );
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
                     &recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            credentials.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn different_queries_produce_different_signatures() {
        let credentials = ApiCredentials::new("key".to_string(), "secret".to_string());
        assert_ne!(
            credentials.sign("timestamp=1"),
            credentials.sign("timestamp=2")
        );
    }
}
