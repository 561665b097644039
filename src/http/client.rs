use crate::error::FotaError;

/// Status and fully buffered body of a small request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Buffered HTTP client used for the manifest check and the tracking report.
/// Transport failures map to `FotaError::Transport`.
pub trait HttpClient {
    /// GET `url`, refusing bodies longer than `max_body` bytes
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, FotaError>;

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, FotaError>;
}
