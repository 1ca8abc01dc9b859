use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde_json::Value;
use ureq::Agent;
use url::Url;

use crate::config::WikiClientConfig;
use crate::error::{Error, HttpError, Result};

const CLIENT_REDIRECTS: u32 = 2;

const RESPONSE_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(128).unwrap();

/// The error infos the API uses when it is overloaded rather than wrong.
const SERVER_BUSY_ANSWERS: [&str; 2] = ["HTTP request timed out.", "Pool queue is full"];

/// Parameters of one API call, before the wire encoding.
#[derive(Clone, Debug)]
pub(crate) struct Query {
    action: &'static str,
    params: Vec<(String, String)>,
}

impl Query {
    pub(crate) fn new() -> Self {
        Self::action("query")
    }

    pub(crate) fn action(action: &'static str) -> Self {
        Query {
            action,
            params: Vec::new(),
        }
    }

    pub(crate) fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }
}

/// One connection to an api.php endpoint.
///
/// Owns the HTTP agent, the headers sent with every call, the request
/// clock honouring the configured rate limit and a small cache for
/// answers that are worth keeping.
pub(crate) struct Session {
    client: Agent,
    endpoint: Url,
    headers: http::HeaderMap,
    rate_limit: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
    cache: Mutex<LruCache<String, Value>>,
}

impl Session {
    pub(crate) fn new(config: &WikiClientConfig) -> Result<Self> {
        let builder = ureq::config::Config::builder()
            .max_redirects(CLIENT_REDIRECTS)
            .timeout_global(config.timeout);

        Ok(Session {
            client: Agent::new_with_config(builder.build()),
            endpoint: config.endpoint()?,
            headers: config.headers.clone(),
            rate_limit: config.rate_limit,
            last_request: Mutex::new(None),
            cache: Mutex::new(LruCache::new(RESPONSE_CACHE_SIZE)),
        })
    }

    pub(crate) fn request(&self, query: &Query) -> Result<Value> {
        let url = self.request_url(query);

        self.throttle();

        let body = self.fetch(&url)?;
        let response = serde_json::from_str(body.as_str())?;

        surface_api_error(response)
    }

    /// Like [`Self::request`], but answers repeats of the same call
    /// from memory. Cache hits skip the rate limit.
    pub(crate) fn request_cached(&self, query: &Query) -> Result<Value> {
        let url = self.request_url(query);
        let key = url.as_str().to_owned();

        if let Some(hit) = self.cache.lock().expect("Response cache is poisoned").get(&key) {
            log::debug!("Answering '{key}' from the cache");
            return Ok(hit.clone());
        }

        let response = self.request(query)?;

        self.cache
            .lock()
            .expect("Response cache is poisoned")
            .put(key, response.clone());

        Ok(response)
    }

    fn request_url(&self, query: &Query) -> Url {
        let mut url = self.endpoint.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            pairs.append_pair("action", query.action);

            for (name, value) in &query.params {
                pairs.append_pair(name, value);
            }
        }

        url
    }

    fn fetch(&self, url: &Url) -> Result<String, HttpError> {
        log::info!("Loading answer from url '{}'", &url);

        let mut request = self.client.get(url.to_string());

        for (name, value) in self.headers.clone() {
            request = request.header(name.expect("All headers must have a name"), value);
        }

        Ok(request
            .call()
            .and_then(|body| body.into_body().read_to_string())?)
    }

    /// Block until the configured delay since the previous request has
    /// passed. The first request is never delayed.
    fn throttle(&self) {
        let Some(min_wait) = self.rate_limit else {
            return;
        };

        let mut last_request = self.last_request.lock().expect("Request clock is poisoned");

        if let Some(previous) = *last_request {
            let wait = min_wait.saturating_sub(previous.elapsed());

            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }

        *last_request = Some(Instant::now());
    }
}

/// Hoist an `error` member of the response body into a `Result`.
fn surface_api_error(response: Value) -> Result<Value> {
    if let Some(error) = response.get("error") {
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();

        if SERVER_BUSY_ANSWERS.contains(&info.as_str()) {
            return Err(Error::ServerBusy { info });
        }

        return Err(Error::Api { code, info });
    }

    if let Some(warnings) = response.get("warnings") {
        log::warn!("API answered with warnings: {warnings}");
    }

    Ok(response)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::{Query, Session, surface_api_error};
    use crate::config::WikiClientConfig;
    use crate::error::Error;

    #[test]
    fn request_urls_carry_format_and_action() {
        let session = Session::new(&WikiClientConfig::default())
            .expect("Default configuration is invalid");

        let url = session.request_url(&Query::new().param("titles", "Oslo fjord"));

        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/w/api.php?format=json&action=query&titles=Oslo+fjord"
        );
    }

    #[test]
    fn parse_actions_are_encoded() {
        let session = Session::new(&WikiClientConfig::default())
            .expect("Default configuration is invalid");

        let url = session.request_url(&Query::action("parse").param("prop", "sections"));

        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/w/api.php?format=json&action=parse&prop=sections"
        );
    }

    #[test]
    fn plain_answers_pass_through() {
        let response = surface_api_error(json!({ "batchcomplete": "" }))
            .expect("Plain answer did not pass");

        assert_eq!(response, json!({ "batchcomplete": "" }));
    }

    #[test]
    fn error_members_become_api_errors() {
        let error = surface_api_error(json!({
            "error": { "code": "unknown_action", "info": "Unrecognized value" }
        }))
        .expect_err("Error member passed through");

        assert!(matches!(error, Error::Api { code, .. } if code == "unknown_action"));
    }

    #[test]
    fn busy_answers_become_server_busy_errors() {
        for info in super::SERVER_BUSY_ANSWERS {
            let error = surface_api_error(json!({
                "error": { "code": "internal_api_error_DBQueryError", "info": info }
            }))
            .expect_err("Busy answer passed through");

            assert!(matches!(error, Error::ServerBusy { info: reported } if reported == info));
        }
    }
}
