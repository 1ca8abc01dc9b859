#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod language;
mod page;
mod response;
mod session;

pub use client::{CategoryMemberKind, CategorySelector, PageRequest, WikiClient};

pub use config::{HeaderError, WikiClientConfig};

pub use error::{Error, HttpError, Result};

pub use language::{LanguageInvalidError, WikiLanguage};

pub use page::WikiPage;

pub use response::SiteLanguage;

pub use url::Url;

pub use isolang::Language;
