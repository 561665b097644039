// Manifest and tracking requests over the ESP-IDF HTTP client

use embedded_svc::http::client::Client;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::{Read, Write};
use std::fmt::Debug;
use std::time::Duration;

use crate::error::FotaError;
use crate::http::{HttpClient, HttpResponse};

pub struct EspHttpClient {
    timeout: Duration,
}

impl EspHttpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(&self) -> Result<Client<EspHttpConnection>, FotaError> {
        let config = HttpConfig {
            buffer_size: Some(1024),
            timeout: Some(self.timeout),
            ..Default::default()
        };
        Ok(Client::wrap(EspHttpConnection::new(&config).map_err(transport)?))
    }
}

impl HttpClient for EspHttpClient {
    fn get(&mut self, url: &str, max_body: usize) -> Result<HttpResponse, FotaError> {
        let mut client = self.client()?;
        let request = client.request(Method::Get, url, &[]).map_err(transport)?;
        let mut response = request.submit().map_err(transport)?;
        let status = response.status();

        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = response.read(&mut buf).map_err(transport)?;
            if n == 0 {
                break;
            }
            if body.len() + n > max_body {
                return Err(FotaError::Transport(format!(
                    "response body exceeds {} bytes",
                    max_body
                )));
            }
            body.extend_from_slice(&buf[..n]);
        }

        Ok(HttpResponse { status, body })
    }

    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<HttpResponse, FotaError> {
        let content_length = body.len().to_string();
        let mut all_headers = headers.to_vec();
        all_headers.push(("Content-Length", content_length.as_str()));

        let mut client = self.client()?;
        let mut request = client
            .request(Method::Post, url, &all_headers)
            .map_err(transport)?;
        request.write_all(body).map_err(transport)?;
        request.flush().map_err(transport)?;
        let response = request.submit().map_err(transport)?;

        Ok(HttpResponse {
            status: response.status(),
            body: Vec::new(),
        })
    }
}

fn transport<E: Debug>(e: E) -> FotaError {
    FotaError::Transport(format!("{:?}", e))
}
