/// PlayOn Cloud API client.
///
/// `PlayOnClient` is unauthenticated; `login` exchanges credentials for a
/// `Session` whose HTTP client carries the auth token on every request.
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, ORIGIN, REFERER, USER_AGENT,
};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info};

use playon_shared::api_protocol::{
    cache_buster, decode_response, download_url, library_url, login_url, ApiOperation, DownloadData,
    LibraryData, LoginData,
};
use playon_shared::errors::{PlayOnError, PlayOnResult};
use playon_shared::models::{DownloadDescriptor, LibraryItem};

use crate::config::{ClientConfig, Credentials};

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:130.0) Gecko/20100101 Firefox/130.0";
const WEB_ORIGIN: &str = "https://www.playonrecorder.com";

/// Headers the web app sends; the API rejects requests without the `x-mmt-*` pair.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert("x-mmt-app", HeaderValue::from_static("cloud-web"));
    headers.insert("x-mmt-version", HeaderValue::from_static("1.0"));
    headers.insert(ORIGIN, HeaderValue::from_static(WEB_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static("https://www.playonrecorder.com/"));
    headers
}

fn build_http_client(headers: HeaderMap, connect_timeout: Duration) -> PlayOnResult<Client> {
    Ok(Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .build()?)
}

/// Decode an API response. A body that is not a readable envelope is
/// reported by HTTP status when the status itself signals failure.
async fn read_api_response<T: serde::de::DeserializeOwned>(
    operation: ApiOperation,
    url: &str,
    response: Response,
) -> PlayOnResult<T> {
    let status = response.status();
    let body = response.text().await?;

    match decode_response(operation, &body) {
        Err(PlayOnError::MalformedResponse { .. }) if !status.is_success() => {
            Err(PlayOnError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            })
        }
        other => other,
    }
}

/// Client for fetching media from the CDN. Carries the browser headers but
/// never the API token; access is granted by the descriptor's cookies.
pub fn media_client(config: &ClientConfig) -> PlayOnResult<Client> {
    build_http_client(default_headers(), config.connect_timeout)
}

/// Unauthenticated entry point to the service.
pub struct PlayOnClient {
    http: Client,
    config: ClientConfig,
}

impl PlayOnClient {
    pub fn new(config: ClientConfig) -> PlayOnResult<Self> {
        let http = build_http_client(default_headers(), config.connect_timeout)?;
        Ok(Self { http, config })
    }

    /// Log in and return an authenticated session.
    pub async fn login(&self, credentials: &Credentials) -> PlayOnResult<Session> {
        let url = login_url(&self.config.api_base);
        debug!("POST {}", url);

        let form = [
            ("email", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];
        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout)
            .form(&form)
            .send()
            .await?;

        let login: LoginData = read_api_response(ApiOperation::Login, &url, response).await?;
        if login.token.trim().is_empty() {
            return Err(PlayOnError::MalformedResponse {
                operation: ApiOperation::Login,
                reason: "empty token".to_string(),
            });
        }

        let mut headers = default_headers();
        let mut token = HeaderValue::from_str(&login.token).map_err(|e| {
            PlayOnError::MalformedResponse {
                operation: ApiOperation::Login,
                reason: format!("token is not a valid header value: {}", e),
            }
        })?;
        token.set_sensitive(true);
        headers.insert(AUTHORIZATION, token);

        info!("Logged in as {}", credentials.username);
        Ok(Session {
            http: build_http_client(headers, self.config.connect_timeout)?,
            config: self.config.clone(),
        })
    }
}

/// Authenticated session. Owns the only copy of the auth token.
pub struct Session {
    http: Client,
    config: ClientConfig,
}

impl Session {
    async fn get_api<T: serde::de::DeserializeOwned>(
        &self,
        operation: ApiOperation,
        url: &str,
    ) -> PlayOnResult<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        read_api_response(operation, url, response).await
    }

    /// Every recording in the library, in the order the service lists them.
    pub async fn list_library(&self) -> PlayOnResult<Vec<LibraryItem>> {
        let url = library_url(&self.config.api_base, cache_buster());
        let data: LibraryData = self.get_api(ApiOperation::ListLibrary, &url).await?;

        info!("Library lists {} recordings", data.entries.len());
        Ok(data.entries)
    }

    /// Signed URL and cookie set for one recording.
    pub async fn resolve_download(&self, item_id: &str) -> PlayOnResult<DownloadDescriptor> {
        let url = download_url(&self.config.api_base, item_id, cache_buster());
        let data: DownloadData = self.get_api(ApiOperation::ResolveDownload, &url).await?;

        Ok(data.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn config_for(server: &Server) -> ClientConfig {
        ClientConfig {
            api_base: server.url(),
            ..ClientConfig::default()
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "me@example.com".into(),
            password: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn test_login_threads_token_into_session() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/login")
            .match_header("x-mmt-app", "cloud-web")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("email".into(), "me@example.com".into()),
                Matcher::UrlEncoded("password".into(), "hunter2".into()),
            ]))
            .with_body(r#"{"success":true,"data":{"token":"tok-123"}}"#)
            .create_async()
            .await;
        let list = server
            .mock("GET", "/library/all")
            .match_header("authorization", "tok-123")
            .match_query(Matcher::Regex(r"^_=\d+$".into()))
            .with_body(r#"{"success":true,"data":{"entries":[{"ID":1,"Name":"Show A","ReleaseYear":"2020"}]}}"#)
            .create_async()
            .await;

        let client = PlayOnClient::new(config_for(&server)).unwrap();
        let session = client.login(&credentials()).await.unwrap();
        let items = session.list_library().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Show A");
        login.assert_async().await;
        list.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_failure_surfaces_fields() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/login")
            .with_status(401)
            .with_body(r#"{"success":false,"message":"Invalid credentials"}"#)
            .create_async()
            .await;

        let client = PlayOnClient::new(config_for(&server)).unwrap();
        let err = client.login(&credentials()).await.err().unwrap();
        match err {
            PlayOnError::Authentication { fields } => {
                assert_eq!(fields["message"], "Invalid credentials");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_download_failure_is_protocol_error() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/login")
            .with_body(r#"{"success":true,"data":{"token":"t"}}"#)
            .create_async()
            .await;
        let _resolve = server
            .mock("GET", "/library/9/download")
            .match_query(Matcher::Any)
            .with_body(r#"{"success":false,"error":"not ready"}"#)
            .create_async()
            .await;

        let session = PlayOnClient::new(config_for(&server))
            .unwrap()
            .login(&credentials())
            .await
            .unwrap();
        let err = session.resolve_download("9").await.unwrap_err();
        assert!(matches!(
            err,
            PlayOnError::Protocol { operation: ApiOperation::ResolveDownload, .. }
        ));
    }

    #[tokio::test]
    async fn test_unreadable_error_page_reports_status() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/login")
            .with_body(r#"{"success":true,"data":{"token":"t"}}"#)
            .create_async()
            .await;
        let _list = server
            .mock("GET", "/library/all")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("<html><body>Bad Gateway</body></html>")
            .create_async()
            .await;

        let session = PlayOnClient::new(config_for(&server))
            .unwrap()
            .login(&credentials())
            .await
            .unwrap();
        let err = session.list_library().await.unwrap_err();
        match err {
            PlayOnError::HttpStatus { status, url } => {
                assert_eq!(status, 502);
                assert!(url.contains("/library/all"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_download_sends_cache_buster() {
        let mut server = Server::new_async().await;
        let _login = server
            .mock("POST", "/login")
            .with_body(r#"{"success":true,"data":{"token":"t"}}"#)
            .create_async()
            .await;
        let first = cache_buster();
        let resolve = server
            .mock("GET", "/library/5/download")
            .match_query(Matcher::Regex(r"^_=\d+$".into()))
            .with_body(r#"{"success":true,"data":{"url":"https://cdn/a.mp4","data":{"k":"v"}}}"#)
            .expect(2)
            .create_async()
            .await;

        let session = PlayOnClient::new(config_for(&server))
            .unwrap()
            .login(&credentials())
            .await
            .unwrap();
        let descriptor = session.resolve_download("5").await.unwrap();
        session.resolve_download("5").await.unwrap();

        assert_eq!(descriptor.url, "https://cdn/a.mp4");
        assert_eq!(descriptor.cookie_header().as_deref(), Some("k=v"));
        assert!(cache_buster() >= first);
        resolve.assert_async().await;
    }
}
