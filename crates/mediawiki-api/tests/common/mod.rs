use httpmock::MockServer;
use mediawiki_api::{WikiClient, WikiClientConfig};

pub const API_PATH: &str = "/w/api.php";

/// A client that talks to the given mock server instead of Wikipedia.
pub fn client_for(server: &MockServer) -> WikiClient {
    let config = WikiClientConfig::new()
        .api_url(server.url(API_PATH))
        .expect("Mock server url is invalid");

    WikiClient::from_config(config).expect("Mock configuration is invalid")
}
