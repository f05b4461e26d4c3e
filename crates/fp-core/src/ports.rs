use async_trait::async_trait;

use crate::domain::Locale;
use crate::Result;

/// Raw answer of the request layer: status code plus body text.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Hexagonal port for the request layer.
///
/// This crate performs no I/O itself. Adapters own connection handling,
/// retries, and fingerprinting, and feed the returned bodies into the
/// parsers here. The locale is threaded per call; implementations must
/// not keep per-call locale state.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, locale: Option<Locale>) -> Result<TransportResponse>;

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        locale: Option<Locale>,
    ) -> Result<TransportResponse>;
}
