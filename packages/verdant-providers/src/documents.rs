use std::time::Duration;

use reqwest::Client;

use crate::Result;

/// Fetches the raw report bytes from the object store by key.
pub async fn fetch(cfg: &verdant_config::DocumentStoreConfig, object_key: &str) -> Result<Vec<u8>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}/{object_key}", cfg.api_base.trim_end_matches('/'));
	let mut request = client.get(url);

	if let Some(token) = &cfg.bearer_token {
		request = request.bearer_auth(token);
	}

	let res = request.send().await?;
	let bytes = res.error_for_status()?.bytes().await?;

	Ok(bytes.to_vec())
}
