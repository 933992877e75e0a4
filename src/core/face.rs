//! Face expression analysis over the face-feature HTTP API.
//!
//! Requests are authenticated by headers instead of a signed URL: `X-Param`
//! is the base64 JSON `{"image_name": ...}` and `X-CheckSum` is the hex MD5 of
//! `api_key + X-CurTime + X-Param`. The image travels as the raw request body.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::{Digest, Md5};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info};
use zeroize::Zeroize;

use crate::config::FaceCredentials;
use crate::errors::{GatewayError, GatewayResult};

/// Expression names indexed by the service's `label`.
pub const EXPRESSION_LABELS: [&str; 8] = [
    "Anger",
    "Disgust",
    "Happiness",
    "Neutral",
    "Sadness",
    "Surprise",
    "Fear",
    "Contempt",
];

/// Classified expression of the most prominent face in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceExpression {
    pub label: i64,
    pub label_name: String,
    /// Confidence of `label`
    pub rate: f64,
    /// Confidence per label, in label order
    pub rates: Vec<f64>,
    pub statistic: Option<Value>,
}

/// Human-readable name of an expression label.
pub fn label_name(label: i64) -> String {
    usize::try_from(label)
        .ok()
        .and_then(|index| EXPRESSION_LABELS.get(index))
        .map(|name| (*name).to_string())
        .unwrap_or_else(|| format!("expression {label}"))
}

/// Authentication headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceAuthHeaders {
    pub app_id: String,
    pub cur_time: String,
    pub param: String,
    pub checksum: String,
}

impl FaceAuthHeaders {
    /// Build the headers for `image_name` at unix time `cur_time`.
    pub fn at(app_id: &str, api_key: &str, image_name: &str, cur_time: i64) -> Self {
        let cur_time = cur_time.to_string();
        let param = BASE64.encode(json!({ "image_name": image_name }).to_string());

        let mut hasher = Md5::new();
        hasher.update(api_key.as_bytes());
        hasher.update(cur_time.as_bytes());
        hasher.update(param.as_bytes());
        let checksum = format!("{:x}", hasher.finalize());

        Self {
            app_id: app_id.to_string(),
            cur_time,
            param,
            checksum,
        }
    }
}

/// Read the result code, which the service sends as a number or a numeric string.
fn response_code(body: &Value) -> Option<i64> {
    match &body["code"] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn a response body into a [`FaceExpression`].
pub fn parse_expression_response(body: &Value) -> GatewayResult<FaceExpression> {
    let code = response_code(body)
        .ok_or_else(|| GatewayError::DecodeError("Face expression response has no code".to_string()))?;
    let desc = body["desc"]
        .as_str()
        .filter(|d| !d.is_empty())
        .unwrap_or("face expression call failed");

    let first = body["data"]["fileList"]
        .as_array()
        .and_then(|files| files.first());
    let file = match (code, first) {
        (0, Some(file)) => file,
        (code, _) => {
            return Err(GatewayError::ProtocolError {
                code,
                channel: None,
                message: desc.to_string(),
            });
        }
    };

    let label = file["label"].as_i64().unwrap_or(0);
    Ok(FaceExpression {
        label,
        label_name: label_name(label),
        rate: file["rate"].as_f64().unwrap_or(0.0),
        rates: file["rates"]
            .as_array()
            .map(|rates| rates.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default(),
        statistic: body["data"].get("statistic").cloned(),
    })
}

/// Client of the face expression endpoint.
pub struct FaceExpressionClient {
    client: reqwest::Client,
    url: String,
    app_id: String,
    api_key: String,
}

impl FaceExpressionClient {
    pub fn new(url: impl Into<String>, credentials: &FaceCredentials) -> GatewayResult<Self> {
        if credentials.app_id.trim().is_empty() || credentials.api_key.trim().is_empty() {
            return Err(GatewayError::AuthError(
                "Face expression app id and API key must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::ConnectError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            app_id: credentials.app_id.clone(),
            api_key: credentials.api_key.clone(),
        })
    }

    /// Classify the expression in `image`, named `image_name`.
    pub async fn analyze(
        &self,
        image_name: &str,
        image: Vec<u8>,
        deadline: Instant,
    ) -> GatewayResult<FaceExpression> {
        let expression = timeout_at(deadline, self.post_image(image_name, image))
            .await
            .map_err(|_| {
                GatewayError::Timeout("Face expression call exceeded its deadline".to_string())
            })??;
        info!(
            "Face expression: {} (rate {:.4})",
            expression.label_name, expression.rate
        );
        Ok(expression)
    }

    async fn post_image(&self, image_name: &str, image: Vec<u8>) -> GatewayResult<FaceExpression> {
        let headers = FaceAuthHeaders::at(
            &self.app_id,
            &self.api_key,
            image_name,
            OffsetDateTime::now_utc().unix_timestamp(),
        );

        debug!("POST {} ({} bytes, {})", self.url, image.len(), image_name);
        let response = self
            .client
            .post(&self.url)
            .header("X-Appid", &headers.app_id)
            .header("X-CurTime", &headers.cur_time)
            .header("X-Param", &headers.param)
            .header("X-CheckSum", &headers.checksum)
            .body(image)
            .send()
            .await
            .map_err(|e| GatewayError::ConnectError(format!("Face expression request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::ConnectError(format!("Face expression body failed: {e}")))?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::DecodeError(format!("Face expression response is not JSON: {e}"))
        })?;

        parse_expression_response(&body).inspect_err(|e| {
            error!("Face expression analysis failed: {}", e);
        })
    }
}

impl Drop for FaceExpressionClient {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
