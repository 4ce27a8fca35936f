//! Outbound webhook delivery: the single HTTP call a delivery worker makes
//! against a subscriber endpoint.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value as Json};
use uuid::Uuid;

use slurpee_store::{AttemptStatus, Subscriber};

/// Everything a delivery worker needs to turn one HTTP round-trip into a
/// `DeliveryAttempt` row.
pub struct DeliveryOutcome {
    pub request_headers: Json,
    pub response_status_code: Option<i32>,
    pub response_headers: Json,
    pub response_body: String,
    pub status: AttemptStatus,
}

/// POSTs the event's `data` bytes verbatim to `subscriber.endpoint_url`
/// with the delivery identity headers the subscriber needs to verify and
/// dedup the call, reading at most `max_response_body_bytes` of the
/// response body.
pub async fn deliver(
    client: &reqwest::Client,
    subscriber: &Subscriber,
    event_id: Uuid,
    subject: &str,
    data: &Json,
    timeout: Duration,
    max_response_body_bytes: usize,
) -> DeliveryOutcome {
    let request_headers = json!({
        "content-type": "application/json",
        "x-slurpee-secret": subscriber.auth_secret,
        "x-event-id": event_id.to_string(),
        "x-event-subject": subject,
    });

    let body = serde_json::to_vec(data).unwrap_or_default();

    let request = client
        .post(&subscriber.endpoint_url)
        .timeout(timeout)
        .header("content-type", "application/json")
        .header("x-slurpee-secret", &subscriber.auth_secret)
        .header("x-event-id", event_id.to_string())
        .header("x-event-subject", subject)
        .body(body);

    match request.send().await {
        Ok(response) => {
            let status_code = response.status().as_u16() as i32;
            let succeeded = response.status().is_success();

            let response_headers = json!(response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect::<std::collections::HashMap<_, _>>());

            let body_text = read_capped_body(response, max_response_body_bytes).await;

            DeliveryOutcome {
                request_headers,
                response_status_code: Some(status_code),
                response_headers,
                response_body: body_text,
                status: if succeeded {
                    AttemptStatus::Succeeded
                } else {
                    AttemptStatus::Failed
                },
            }
        }
        Err(err) => DeliveryOutcome {
            request_headers,
            response_status_code: None,
            response_headers: json!({}),
            response_body: err.to_string(),
            status: AttemptStatus::Failed,
        },
    }
}

/// Reads a response body up to `max_bytes`, truncating (not erroring) past
/// the cap - the body is diagnostic, not something delivery correctness
/// depends on.
async fn read_capped_body(response: reqwest::Response, max_bytes: usize) -> String {
    let mut buf = Vec::with_capacity(max_bytes.min(8192));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        let remaining = max_bytes.saturating_sub(buf.len());
        if remaining == 0 {
            break;
        }
        let take = remaining.min(chunk.len());
        buf.extend_from_slice(&chunk[..take]);
        if buf.len() >= max_bytes {
            break;
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}
