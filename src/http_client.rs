use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

use crate::error::ApiError;

const USER_AGENT: &str = concat!("maimai_tracker/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client(timeout: Duration) -> Result<&'static Client, ApiError> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ApiError::Transport(format!("failed to build http client: {err}")))
    })
}
