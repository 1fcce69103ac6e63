// src/fetch/client.rs
use std::time::Duration;

use reqwest::header;

use crate::extractors::Extractor;
use crate::rules::{parse_rule, RuleFormat};
use crate::utils::error::{AppError, FetchError};
use crate::utils::html::compact_html;
use crate::value::Value;

use super::encoding::decode_document;

/// Looks like a desktop browser; some sites refuse unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How documents are downloaded and prepared before extraction.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub timeout: Duration,
    /// Collapse whitespace around tags before extracting.
    pub compact: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            compact: true,
        }
    }
}

/// Creates a reqwest client configured from the options.
fn build_client(options: &FetchOptions) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(options.user_agent.as_str())
        .timeout(options.timeout)
        .build()
}

fn parse_url(url: &str) -> Result<reqwest::Url, FetchError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme \"{}\"", other),
        }),
    }
}

/// Downloads a document and decodes it to text.
pub async fn fetch_document(url: &str, options: &FetchOptions) -> Result<String, FetchError> {
    let target = parse_url(url)?;
    let client = build_client(options)?;

    tracing::info!("Downloading document from: {}", url);
    tracing::debug!("Using User-Agent: {}", options.user_agent);

    let response = client
        .get(target)
        .header(header::ACCEPT, "text/html,application/xhtml+xml,text/plain,*/*")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        tracing::error!("HTTP error status: {} for URL: {}", status, url);
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        return Err(FetchError::Http(status));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await?;
    tracing::debug!("Downloaded {} bytes from {}", body.len(), url);

    Ok(decode_document(&body, content_type.as_deref()))
}

/// Compiles the rule, downloads the page and extracts from it.
///
/// The rule is compiled before any request is made, so a broken rule never
/// costs a round trip.
pub async fn extract_from_url(
    url: &str,
    rule_text: &str,
    format: RuleFormat,
    options: &FetchOptions,
) -> Result<Value, AppError> {
    let extractor = Extractor::compile_root(&parse_rule(rule_text, format)?)?;
    let document = fetch_document(url, options).await?;
    let document = if options.compact {
        compact_html(&document)
    } else {
        document
    };
    Ok(extractor.extract(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    const TABLE_RULE: &str = "
dict:
- key: title
  prefix: <h1>
  suffix: </h1>
- key: items
  prefix: <table>
  suffix: </table>
  list:
    prefix: <tr>
    suffix: </tr>
    dict:
    - key: id
      prefix: <td>
      suffix: </td>
    - key: value
      prefix: <td>
      suffix: </td>
      type: int
";

    // Table page with a GBK title ("中文") and no <meta> charset
    fn table_page() -> Vec<u8> {
        let mut page = b"<html>\n<body>\n<h1>".to_vec();
        page.extend_from_slice(b"\xD6\xD0\xCE\xC4");
        page.extend_from_slice(
            b"</h1>\n<table>\n    <tr>\n        <td>001</td>\n        <td>123</td>\n    </tr>\n    <tr>\n        <td>002</td>\n        <td>321</td>\n    </tr>\n</table>\n</body>\n</html>\n",
        );
        page
    }

    fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n", status, body.len());
        for (name, value) in headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        let mut response = head.into_bytes();
        response.extend_from_slice(body);
        response
    }

    /// Answers a single request with `response` and returns the URL to hit.
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/page.html", addr)
    }

    #[test]
    fn test_default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.compact);
        assert!(options.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_parse_url() {
        assert_ok!(parse_url("https://example.com/page.html"));
        assert!(matches!(parse_url("not a url"), Err(FetchError::InvalidUrl { .. })));
        assert!(matches!(
            parse_url("ftp://example.com/file"),
            Err(FetchError::InvalidUrl { reason, .. }) if reason.contains("ftp")
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let result = fetch_document("::nonsense::", &FetchOptions::default()).await;
        assert_err!(&result);
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_extract_from_url_decodes_and_extracts() {
        let response = http_response(
            "200 OK",
            &[("Content-Type", "text/html; charset=gbk")],
            &table_page(),
        );
        let url = serve_once(response).await;
        let result = extract_from_url(&url, TABLE_RULE, RuleFormat::Yaml, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(result["title"], Value::from("中文"));
        let items = result["items"].as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], Value::from("001"));
        assert_eq!(items[0]["value"], Value::Int(123));
        assert_eq!(items[1]["id"], Value::from("002"));
        assert_eq!(items[1]["value"], Value::Int(321));
    }

    #[tokio::test]
    async fn test_fetch_document_returns_decoded_text() {
        let url = serve_once(http_response(
            "200 OK",
            &[("Content-Type", "text/html; charset=gbk")],
            &table_page(),
        ))
        .await;
        let text = assert_ok!(fetch_document(&url, &FetchOptions::default()).await);
        assert!(text.contains("<h1>中文</h1>"));
        // fetch_document itself does not compact
        assert!(text.contains("\n    <tr>"));
    }

    #[tokio::test]
    async fn test_fetch_document_not_found() {
        let url = serve_once(http_response("404 Not Found", &[], b"")).await;
        let result = fetch_document(&url, &FetchOptions::default()).await;
        assert!(matches!(result, Err(FetchError::NotFound(ref missing)) if *missing == url));
    }

    #[tokio::test]
    async fn test_fetch_document_server_error() {
        let url = serve_once(http_response("500 Internal Server Error", &[], b"boom")).await;
        let result = fetch_document(&url, &FetchOptions::default()).await;
        assert!(matches!(
            result,
            Err(FetchError::Http(status)) if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn test_not_found_surfaces_through_extract_from_url() {
        let url = serve_once(http_response("404 Not Found", &[], b"")).await;
        let result = extract_from_url(
            &url,
            "value: {prefix: <title>, suffix: </title>}",
            RuleFormat::Yaml,
            &FetchOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Fetch(FetchError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_bad_rule_fails_before_fetching() {
        // The URL is never contacted: compiling the rule fails first
        let result = extract_from_url(
            "http://127.0.0.1:9/",
            "value: {prefix: <b>}",
            RuleFormat::Yaml,
            &FetchOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
