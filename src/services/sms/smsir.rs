use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SmsProvider;

/// sms.ir REST API (`POST /v1/send/bulk`).
pub struct SmsIrProvider {
    api_url: String,
    api_key: String,
    line_number: String,
    client: reqwest::Client,
}

impl SmsIrProvider {
    pub fn new(api_url: String, api_key: String, line_number: String) -> Self {
        Self {
            api_url,
            api_key,
            line_number,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BulkSendRequest<'a> {
    line_number: i64,
    message_text: &'a str,
    mobiles: [&'a str; 1],
}

#[derive(Deserialize)]
struct SmsIrResponse {
    status: i64,
    message: Option<String>,
    data: Option<BulkSendData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkSendData {
    pack_id: Option<String>,
    message_ids: Option<Vec<i64>>,
}

#[async_trait]
impl SmsProvider for SmsIrProvider {
    async fn send(&self, to: &str, text: &str) -> anyhow::Result<String> {
        let url = format!("{}/v1/send/bulk", self.api_url.trim_end_matches('/'));
        let line_number = self
            .line_number
            .parse()
            .context("SMS_LINE_NUMBER must be numeric")?;

        let resp: SmsIrResponse = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&BulkSendRequest {
                line_number,
                message_text: text,
                mobiles: [to],
            })
            .send()
            .await
            .context("failed to reach sms.ir")?
            .error_for_status()
            .context("sms.ir returned error")?
            .json()
            .await
            .context("failed to parse sms.ir response")?;

        if resp.status != 1 {
            anyhow::bail!(
                "sms.ir rejected message: status {} ({})",
                resp.status,
                resp.message.unwrap_or_default()
            );
        }

        let data = resp.data.context("sms.ir response missing data")?;
        data.message_ids
            .and_then(|ids| ids.first().map(|id| id.to_string()))
            .or(data.pack_id)
            .context("sms.ir response missing message id")
    }
}
