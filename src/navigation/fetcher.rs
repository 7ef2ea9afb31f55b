//! `reqwest`-backed fetcher with a shared cookie jar.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::header;
use reqwest::cookie::{CookieStore, Jar};

use crate::navigation::{Credentials, FetchError, FetchRequest, FetchResponse, Fetcher, RedirectMode};

/// Fetches over HTTP, attaching and storing cookies according to each
/// request's credentials mode.
#[derive(Clone)]
pub struct ReqwestFetcher {
    jar: Arc<Jar>,
    follow: reqwest::Client,
    manual: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(jar: Arc<Jar>) -> Result<Self, FetchError> {
        Self::with_builder(jar, || reqwest::Client::builder().timeout(Duration::from_secs(30)))
    }

    /// Build both clients from `builder`; the redirect policy is set here.
    pub fn with_builder(
        jar: Arc<Jar>,
        builder: impl Fn() -> reqwest::ClientBuilder,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            jar,
            follow: builder().build()?,
            manual: builder().redirect(reqwest::redirect::Policy::none()).build()?,
        })
    }

    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    fn sends_cookies(request: &FetchRequest) -> bool {
        match request.credentials {
            Credentials::Omit => false,
            Credentials::Include => true,
            Credentials::SameOrigin => request
                .initiator
                .as_ref()
                .map(|page| page.origin() == request.url.origin())
                .unwrap_or(true),
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let with_cookies = Self::sends_cookies(&request);
        let client = match request.redirect {
            RedirectMode::Follow => &self.follow,
            RedirectMode::Manual => &self.manual,
        };

        let mut headers = request.headers.clone();
        if with_cookies {
            if let Some(cookies) = self.jar.cookies(&request.url) {
                headers.insert(header::COOKIE, cookies);
            }
        }

        let response = client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .send()
            .await?;

        let url = response.url().clone();
        if with_cookies {
            let mut set_cookies = response.headers().get_all(header::SET_COOKIE).iter();
            self.jar.set_cookies(&mut set_cookies, &url);
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(FetchResponse {
            url,
            status,
            headers,
            body,
        })
    }
}
