use std::{str::FromStr, time::Duration};

use http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::error::{Error, HttpError};
use crate::language::WikiLanguage;

const USER_AGENT: &'static str = concat!(
    std::env!("CARGO_PKG_NAME"),
    "/",
    std::env!("CARGO_PKG_VERSION")
);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("{0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("{0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("{0}")]
    HeaderMapMaxSizeReached(#[from] http::header::MaxSizeReached),
}

pub struct WikiClientConfig {
    pub(crate) language: WikiLanguage,
    pub(crate) api_url: Option<Url>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) rate_limit: Option<Duration>,
    // Only non defaults
    pub(crate) headers: HeaderMap<HeaderValue>,
}

impl WikiClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(self, user_agent: impl std::fmt::Display) -> Result<Self, HeaderError> {
        self.add_header(http::header::USER_AGENT, user_agent)
    }

    pub fn timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    /// Minimum delay between two consecutive API requests.
    pub fn rate_limit(self, rate_limit: Option<Duration>) -> Self {
        Self { rate_limit, ..self }
    }

    pub fn language(self, language: WikiLanguage) -> Self {
        Self { language, ..self }
    }

    /// Talks to the given api.php endpoint instead of the Wikipedia
    /// edition derived from the configured language.
    pub fn api_url(self, api_url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            api_url: Some(Url::parse(api_url.as_ref())?),
            ..self
        })
    }

    pub fn add_header(
        mut self,
        name: impl std::fmt::Display,
        value: impl std::fmt::Display,
    ) -> Result<Self, HeaderError> {
        self.headers.try_insert(
            HeaderName::from_str(name.to_string().as_str())?,
            HeaderValue::from_str(value.to_string().as_str())?,
        )?;

        Ok(self)
    }

    pub(crate) fn endpoint(&self) -> Result<Url, Error> {
        if let Some(api_url) = &self.api_url {
            return Ok(api_url.clone());
        }

        let url = format!("https://{}.wikipedia.org/w/api.php", self.language.code()?);

        Ok(Url::parse(url.as_str()).map_err(HttpError::from)?)
    }
}

impl Default for WikiClientConfig {
    fn default() -> Self {
        WikiClientConfig {
            language: WikiLanguage::default(),
            api_url: None,
            timeout: Some(DEFAULT_TIMEOUT),
            rate_limit: None,
            headers: HeaderMap::new(),
        }
        .user_agent(USER_AGENT)
        .expect("Default headers are invalid")
    }
}
