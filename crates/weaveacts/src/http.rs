use async_trait::async_trait;
use std::collections::HashMap;
use weavecore::{Activity, ActivityContext, ActivityError, Value};

/// Real HTTP GET activity. Returns a mapping with `status` and `body`; the
/// substrate's start-to-close timeout bounds the request.
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Activity for HttpFetch {
    fn name(&self) -> &str {
        "http.fetch"
    }

    async fn run(&self, _ctx: ActivityContext, args: Vec<Value>) -> Result<Value, ActivityError> {
        let url = args
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| ActivityError::Failed("http.fetch expects a url string".into()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ActivityError::Failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ActivityError::Failed(format!("failed to read response: {}", e)))?;

        let mut out = HashMap::new();
        out.insert("status".to_string(), Value::Int(status as i64));
        out.insert("body".to_string(), Value::Str(body));
        Ok(Value::Map(out))
    }
}
