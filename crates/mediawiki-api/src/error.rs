use thiserror::Error;

use crate::language::LanguageInvalidError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The errors that may occur below the API protocol.
#[derive(Debug, Error)]
pub enum HttpError {
    /// An unknown error with the backend (ureq)
    #[error("Error with HTTP backend: {0}")]
    Backend(#[from] ureq::Error),
    /// The provided URL couldn't be parsed
    #[error("Error parsing URL: {0}")]
    UrlParseError(#[from] url::ParseError),
}

/// The errors that may occur while talking to a MediaWiki site.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Language(#[from] LanguageInvalidError),
    /// The response body was not the JSON the API promises
    #[error("Failed to deserialise response: {0}")]
    Json(#[from] serde_json::Error),
    /// The API answered with an error member
    #[error("API error '{code}': {info}")]
    Api { code: String, info: String },
    /// The API reported that it is too busy to answer
    #[error("API could not answer in time: {info}")]
    ServerBusy { info: String },
    /// No page matches the requested title or id
    #[error("No page matches '{query}'")]
    PageMissing { query: String },
    /// The requested page is a redirect and following it was refused
    #[error("'{from}' redirects to '{to}'")]
    Redirected { from: String, to: String },
    /// The response decoded, but its shape does not fit the request
    #[error("Unexpected response shape: {context}")]
    Malformed { context: String },
}

impl Error {
    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        Error::Malformed {
            context: context.into(),
        }
    }
}
