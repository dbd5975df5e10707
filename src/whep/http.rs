//! WHEP HTTP exchange

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{StatusCode, Url};
use tracing::{debug, info};

use crate::config::WhepConfig;
use crate::error::{AppError, Result};
use crate::webrtc::signaling::SDP_CONTENT_TYPE;

/// Successful response to an offer
#[derive(Debug, Clone)]
pub struct WhepAnswer {
    pub status: StatusCode,
    /// SDP answer body
    pub sdp: String,
    /// Session resource from the `Location` header, resolved against the request URL
    pub resource_url: Option<Url>,
}

/// HTTP client for the WHEP endpoint
#[derive(Debug, Clone)]
pub struct WhepSignaling {
    client: reqwest::Client,
    max_redirects: usize,
}

impl WhepSignaling {
    pub fn new(config: &WhepConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(SDP_CONTENT_TYPE));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| AppError::Config("Invalid user agent".to_string()))?,
        );
        if let Some(token) = config.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AppError::Config("Invalid bearer token".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        // Redirects are followed by hand so the offer is re-POSTed
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout())
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
        })
    }

    /// POST the offer and return the answer
    pub async fn post_offer(&self, url: &Url, offer: &str) -> Result<WhepAnswer> {
        let mut target = url.clone();

        for _ in 0..=self.max_redirects {
            debug!("POST offer to {} ({} bytes)", target, offer.len());
            let response = self
                .client
                .post(target.clone())
                .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
                .body(offer.to_string())
                .send()
                .await?;
            let status = response.status();

            if status.is_redirection() {
                let next = resolve_location(&target, response.headers())?.ok_or_else(|| {
                    AppError::InvalidRedirect(format!("{} without Location header", status))
                })?;
                info!("WHEP endpoint redirected ({}): {} -> {}", status, target, next);
                target = next;
                continue;
            }

            if status != StatusCode::OK && status != StatusCode::CREATED {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => format!("<unreadable body: {}>", e),
                };
                return Err(AppError::NegotiationRejected { status, body });
            }

            let resource_url = resolve_location(&target, response.headers()).unwrap_or_else(|e| {
                debug!("Ignoring unusable resource location: {}", e);
                None
            });
            let sdp = response.text().await?;

            return Ok(WhepAnswer {
                status,
                sdp,
                resource_url,
            });
        }

        Err(AppError::TooManyRedirects(self.max_redirects))
    }

    /// Tear down the session resource
    pub async fn delete_resource(&self, url: &Url) -> Result<StatusCode> {
        let response = self.client.delete(url.clone()).send().await?;
        Ok(response.status())
    }
}

/// Resolve a `Location` header against the URL that produced it
fn resolve_location(base: &Url, headers: &HeaderMap) -> Result<Option<Url>> {
    let Some(value) = headers.get(LOCATION) else {
        return Ok(None);
    };
    let location = value
        .to_str()
        .map_err(|_| AppError::InvalidRedirect("Location header is not valid text".to_string()))?;
    base.join(location)
        .map(Some)
        .map_err(|e| AppError::InvalidRedirect(format!("{}: {}", location, e)))
}
