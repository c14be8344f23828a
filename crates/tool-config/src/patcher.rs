//! Idempotent rewrite of a compiled tool-configuration document.
//!
//! Routes every request template through the gateway's `baseUrl` config
//! variable and injects a templated bearer header so the document never
//! carries a literal secret. Running the patch twice is a no-op.

use crate::document::{HeaderEntry, ServerSection, ToolConfigDocument};

/// Template variable the gateway substitutes with its configured base URL.
pub const BASE_URL_TEMPLATE: &str = "{{.config.baseUrl}}";
/// Templated bearer value; the key itself stays in gateway-managed config.
pub const BEARER_TEMPLATE: &str = "Bearer {{.config.apikey}}";

const AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone)]
pub struct PatchOptions<'a> {
    pub base_url: &'a str,
    /// `None` when authentication is skipped: no `apikey` config entry and no
    /// Authorization header are written.
    pub api_key: Option<&'a str>,
}

/// Applies the gateway rewrite in place.
pub fn patch(doc: &mut ToolConfigDocument, opts: &PatchOptions<'_>) {
    let server = doc.server.get_or_insert_with(ServerSection::default);
    let config = server.config.get_or_insert_with(Default::default);
    config.insert(
        "baseUrl".to_string(),
        serde_yaml::Value::String(opts.base_url.to_string()),
    );
    if let Some(key) = opts.api_key {
        config.insert(
            "apikey".to_string(),
            serde_yaml::Value::String(key.to_string()),
        );
    }

    for tool in &mut doc.tools {
        let Some(template) = tool.request_template.as_mut() else {
            continue;
        };
        if let Some(url) = template.url.as_deref() {
            let rewritten = rewrite_url(url);
            if rewritten != url {
                tracing::debug!(tool = tool.name.as_deref(), from = url, to = %rewritten, "rewrote template url");
                template.url = Some(rewritten);
            }
        }
        if opts.api_key.is_some() {
            set_bearer_header(&mut template.headers);
        }
    }
}

/// Rewrites a template URL onto the base-URL variable. Already-rewritten
/// URLs are recognized and left untouched.
fn rewrite_url(url: &str) -> String {
    if url.starts_with(BASE_URL_TEMPLATE) {
        return url.to_string();
    }
    let path = if url.starts_with("http://") || url.starts_with("https://") {
        // Absolute: strip scheme + host, keep the path component.
        url.splitn(4, '/').nth(3).unwrap_or("")
    } else {
        url.trim_start_matches('/')
    };
    format!("{BASE_URL_TEMPLATE}/{path}")
}

/// Ensures exactly one Authorization header carrying the templated bearer
/// value: existing headers are overwritten in place, never duplicated.
fn set_bearer_header(headers: &mut Vec<HeaderEntry>) {
    if let Some(existing) = headers.iter_mut().find(|h| h.key == AUTHORIZATION) {
        existing.value = BEARER_TEMPLATE.to_string();
        return;
    }
    headers.push(HeaderEntry {
        key: AUTHORIZATION.to_string(),
        value: BEARER_TEMPLATE.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{RequestTemplate, ToolEntry};

    fn doc_with_url(url: &str) -> ToolConfigDocument {
        ToolConfigDocument {
            tools: vec![ToolEntry {
                name: Some("get_forecast".to_string()),
                request_template: Some(RequestTemplate {
                    url: Some(url.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn opts<'a>() -> PatchOptions<'a> {
        PatchOptions {
            base_url: "http://127.0.0.1:8000",
            api_key: Some("secret"),
        }
    }

    fn template_url(doc: &ToolConfigDocument) -> &str {
        doc.tools[0]
            .request_template
            .as_ref()
            .and_then(|t| t.url.as_deref())
            .expect("url")
    }

    #[test]
    fn absolute_url_keeps_path_only() {
        let mut doc = doc_with_url("https://api.example.com/v1/forecast?units=c");
        patch(&mut doc, &opts());
        assert_eq!(
            template_url(&doc),
            "{{.config.baseUrl}}/v1/forecast?units=c"
        );
    }

    #[test]
    fn relative_url_loses_leading_slash() {
        let mut doc = doc_with_url("/v1/forecast");
        patch(&mut doc, &opts());
        assert_eq!(template_url(&doc), "{{.config.baseUrl}}/v1/forecast");
    }

    #[test]
    fn hostname_only_absolute_url_maps_to_empty_path() {
        let mut doc = doc_with_url("https://api.example.com");
        patch(&mut doc, &opts());
        assert_eq!(template_url(&doc), "{{.config.baseUrl}}/");
    }

    #[test]
    fn repatch_is_a_noop() {
        let mut doc = doc_with_url("https://api.example.com/v1/forecast");
        patch(&mut doc, &opts());
        let first = doc.to_yaml_string().expect("render");
        patch(&mut doc, &opts());
        let second = doc.to_yaml_string().expect("render");
        assert_eq!(first, second);
    }

    #[test]
    fn authorization_header_is_overwritten_not_duplicated() {
        let mut doc = doc_with_url("/v1/forecast");
        doc.tools[0]
            .request_template
            .as_mut()
            .expect("template")
            .headers
            .push(HeaderEntry {
                key: "Authorization".to_string(),
                value: "Bearer literal-token".to_string(),
            });
        patch(&mut doc, &opts());
        patch(&mut doc, &opts());

        let headers = &doc.tools[0].request_template.as_ref().expect("template").headers;
        let auth: Vec<_> = headers.iter().filter(|h| h.key == "Authorization").collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].value, BEARER_TEMPLATE);
    }

    #[test]
    fn skip_auth_writes_no_apikey_and_no_header() {
        let mut doc = doc_with_url("/v1/forecast");
        patch(
            &mut doc,
            &PatchOptions {
                base_url: "http://127.0.0.1:8000",
                api_key: None,
            },
        );
        let config = doc
            .server
            .as_ref()
            .and_then(|s| s.config.as_ref())
            .expect("config");
        assert!(config.contains_key("baseUrl"));
        assert!(!config.contains_key("apikey"));
        assert!(
            doc.tools[0]
                .request_template
                .as_ref()
                .expect("template")
                .headers
                .is_empty()
        );
    }

    #[test]
    fn base_url_always_refreshed() {
        let mut doc = doc_with_url("/v1/forecast");
        patch(&mut doc, &opts());
        patch(
            &mut doc,
            &PatchOptions {
                base_url: "http://10.0.0.2:8000",
                api_key: Some("secret"),
            },
        );
        let config = doc
            .server
            .as_ref()
            .and_then(|s| s.config.as_ref())
            .expect("config");
        assert_eq!(
            config.get("baseUrl"),
            Some(&serde_yaml::Value::String("http://10.0.0.2:8000".into()))
        );
    }
}
