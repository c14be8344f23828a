//! Direct HTTP transport for the self-hosted gateway console.
//!
//! The console uses a cookie session established by `POST /session/login`;
//! [`HttpTransport::bootstrap`] runs the full probe / init / login sequence a
//! fresh console needs before any resource call succeeds.

use crate::error::{ControlPlaneError, Result};
use crate::transport::{ApiRequest, Method, Transport};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

pub struct HttpTransport {
    base: Url,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ControlPlaneError::Transport(format!("build http client: {e}")))?;
        Ok(Self { base, http })
    }

    /// Probe → init → login. Initializing an already-initialized console is
    /// tolerated; a failed login is not.
    pub async fn bootstrap(&self, username: &str, admin_password: &str) -> Result<()> {
        self.probe().await?;
        self.init_system(admin_password).await?;
        self.login(username, admin_password).await
    }

    /// Health probe. An unhealthy status is logged but only connection-level
    /// failures abort the bootstrap.
    pub async fn probe(&self) -> Result<()> {
        match self.execute(ApiRequest::get("/health")).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                tracing::warn!(base = %self.base, error = %e, "console health probe failed");
                Ok(())
            }
        }
    }

    /// First-run system initialization. The console reports an error when it
    /// was already initialized; that condition is absorbed here.
    pub async fn init_system(&self, admin_password: &str) -> Result<()> {
        let body = json!({
            "adminUser": {
                "name": "admin",
                "displayName": "admin",
                "password": admin_password,
            }
        });
        match self.execute(ApiRequest::post("/system/init", body)).await {
            Ok(_) => {
                tracing::info!("console initialized");
                Ok(())
            }
            Err(e) if e.is_transient() => Err(e),
            Err(ControlPlaneError::Api { message, .. }) if message.contains("initialized") => {
                tracing::debug!("console already initialized");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "system init failed, attempting login anyway");
                Ok(())
            }
        }
    }

    /// Logs in and stores the session cookie on this client. Success is
    /// signalled by a `displayName` in the response body.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let body = json!({
            "username": username,
            "password": password,
            "autoLogin": true,
        });
        let resp = self.execute(ApiRequest::post("/session/login", body)).await?;
        match resp.get("displayName").filter(|v| !v.is_null()) {
            Some(name) => {
                tracing::info!(username, display_name = %name, "logged in to console");
                Ok(())
            }
            None => Err(ControlPlaneError::Api {
                operation: "POST /session/login".to_string(),
                code: "Unauthorized".to_string(),
                message: resp
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("login response carried no displayName")
                    .to_string(),
            }),
        }
    }

    // Concatenates rather than `Url::join`s so a path prefix on the
    // operator-supplied base (e.g. `/console`) survives the absolute
    // resource paths this crate sends.
    fn url_for(&self, req: &ApiRequest) -> Result<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", req.path)).map_err(|e| {
            ControlPlaneError::Transport(format!("join base url with '{}': {e}", req.path))
        })?;
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, req: ApiRequest) -> Result<Value> {
        let url = self.url_for(&req)?;
        tracing::debug!(request = %req, "console request");

        let mut builder = match req.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
            Method::Put => self.http.put(url),
            Method::Delete => self.http.delete(url),
        };
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            ControlPlaneError::Transport(format!("{req}: {e}"))
        })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ControlPlaneError::Transport(format!("{req}: read body: {e}")))?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ControlPlaneError::NotFound {
                resource: req.path.clone(),
            });
        }
        if status == reqwest::StatusCode::CONFLICT {
            return Err(ControlPlaneError::Conflict {
                resource: req.path.clone(),
            });
        }
        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            // The console reports create races as a 4xx with an "already
            // exists" message rather than a 409.
            if message.to_lowercase().contains("already exist") {
                return Err(ControlPlaneError::Conflict {
                    resource: req.path.clone(),
                });
            }
            return Err(ControlPlaneError::Api {
                operation: req.to_string(),
                code: status.as_u16().to_string(),
                message,
            });
        }

        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ControlPlaneError::Malformed {
            operation: req.to_string(),
            message: format!("response is not valid JSON: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        let base = Url::parse(base).expect("base url");
        HttpTransport::new(base, Duration::from_secs(5)).expect("client")
    }

    #[test]
    fn base_path_prefix_survives_resource_paths() {
        let t = transport("https://gw.example.com/console/");
        let url = t.url_for(&ApiRequest::get("/v1/routes")).expect("url");
        assert_eq!(url.as_str(), "https://gw.example.com/console/v1/routes");
    }

    #[test]
    fn query_parameters_are_appended() {
        let t = transport("http://127.0.0.1:8080");
        let req = ApiRequest::get("/v1/consumers").query("name", "toolgate");
        let url = t.url_for(&req).expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/v1/consumers?name=toolgate");
    }
}
