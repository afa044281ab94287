//! Icinga 2 REST API client with streamed events

use crate::directory::{DirectoryClient, DirectoryError, DirectoryResult, EventStream, Subscription};
use futures::StreamExt;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};
use usersyncd_core::{ApiSettings, Credential, CredentialSpec, Event, Resource};

const HOSTS: &str = "hosts";
const API_USERS: &str = "apiusers";

pub struct Icinga2Client {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl Icinga2Client {
    pub fn new(api: &ApiSettings) -> DirectoryResult<Self> {
        let mut builder = Client::builder();

        if let Some(ca) = &api.ca_certificate {
            let pem = std::fs::read(ca)
                .map_err(|e| DirectoryError::Tls(format!("{}: {}", ca.display(), e)))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| DirectoryError::Tls(format!("{}: {}", ca.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(cert_path) = &api.certificate {
            let key_path = api
                .key
                .as_ref()
                .ok_or_else(|| DirectoryError::Tls("client certificate without key".into()))?;
            let mut pem = std::fs::read(cert_path)
                .map_err(|e| DirectoryError::Tls(format!("{}: {}", cert_path.display(), e)))?;
            pem.push(b'\n');
            pem.extend(
                std::fs::read(key_path)
                    .map_err(|e| DirectoryError::Tls(format!("{}: {}", key_path.display(), e)))?,
            );
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| DirectoryError::Tls(format!("{}: {}", cert_path.display(), e)))?;
            builder = builder.identity(identity);
        }

        let client = builder.build()?;
        Self::with_client(client, api)
    }

    /// Use a preconfigured reqwest client (TLS already set up).
    pub fn with_client(client: Client, api: &ApiSettings) -> DirectoryResult<Self> {
        Ok(Self {
            client,
            base_url: parse_base_url(&api.url)?,
            username: api.username.clone(),
            password: api.password.clone(),
            timeout: api.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> DirectoryResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DirectoryError::RequestFailed(format!("bad endpoint {}: {}", path, e)))
    }

    /// URL of a single named object; the name is percent-encoded.
    pub fn object_url(&self, plural: &str, name: &str) -> DirectoryResult<Url> {
        let mut url = self.endpoint(&format!("v1/objects/{}", plural))?;
        url.path_segments_mut()
            .map_err(|_| DirectoryError::RequestFailed(format!("cannot address {}", name)))?
            .push(name);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    async fn query_objects(&self, plural: &str, body: &QueryBody<'_>) -> DirectoryResult<Vec<String>> {
        let url = self.endpoint(&format!("v1/objects/{}", plural))?;
        debug!("Listing {} (filter={:?})", plural, body.filter);

        let response = self
            .request(reqwest::Method::POST, url)
            .header("X-HTTP-Method-Override", "GET")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;

        let list: ObjectList = match check_status(response).await {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?,
            // Icinga answers 404 for a filter that matches nothing
            Err(DirectoryError::NotFound(_)) => ObjectList::default(),
            Err(e) => return Err(e),
        };
        Ok(list.results.into_iter().map(|o| o.name).collect())
    }
}

#[async_trait::async_trait]
impl DirectoryClient for Icinga2Client {
    async fn list_resources(&self, filter: Option<&str>) -> DirectoryResult<Vec<Resource>> {
        let body = QueryBody {
            attrs: &["name"],
            filter,
            filter_vars: None,
        };
        let names = self.query_objects(HOSTS, &body).await?;
        Ok(names.into_iter().map(Resource::new).collect())
    }

    async fn get_resource(
        &self,
        name: &str,
        filter: Option<&str>,
    ) -> DirectoryResult<Option<Resource>> {
        let expr = single_host_filter(filter);
        let body = QueryBody {
            attrs: &["name"],
            filter: Some(&expr),
            filter_vars: Some(json!({ "resource_name": name })),
        };
        let names = self.query_objects(HOSTS, &body).await?;
        Ok(names.into_iter().find(|n| n == name).map(Resource::new))
    }

    async fn list_credentials(&self) -> DirectoryResult<Vec<Credential>> {
        let body = QueryBody {
            attrs: &["name"],
            filter: None,
            filter_vars: None,
        };
        let names = self.query_objects(API_USERS, &body).await?;
        Ok(names.into_iter().map(Credential::new).collect())
    }

    async fn create_credential(&self, name: &str, spec: &CredentialSpec) -> DirectoryResult<()> {
        let url = self.object_url(API_USERS, name)?;
        debug!("Creating ApiUser {}", name);
        let response = self
            .request(reqwest::Method::PUT, url)
            .timeout(self.timeout)
            .json(spec)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_credential(&self, name: &str) -> DirectoryResult<()> {
        let mut url = self.object_url(API_USERS, name)?;
        url.query_pairs_mut().append_pair("cascade", "1");
        debug!("Deleting ApiUser {}", name);
        let response = self
            .request(reqwest::Method::DELETE, url)
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn subscribe(&self, subscription: &Subscription) -> DirectoryResult<EventStream> {
        let url = self.endpoint("v1/events")?;
        let body = EventsBody {
            queue: &subscription.queue,
            types: subscription.types.iter().map(|t| t.as_str()).collect(),
            filter: subscription.filter.as_deref(),
        };
        debug!("Subscribing to {:?} on queue {}", body.types, body.queue);

        // No timeout: the response body is the stream.
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(Box::pin(parse_event_stream(response.bytes_stream())))
    }
}

fn parse_base_url(raw: &str) -> DirectoryResult<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| DirectoryError::RequestFailed(format!("invalid url {}: {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Filter selecting one host by the `resource_name` filter variable,
/// still subject to the configured filter.
pub fn single_host_filter(filter: Option<&str>) -> String {
    match filter {
        Some(f) => format!("host.name == resource_name && ({})", f),
        None => "host.name == resource_name".to_string(),
    }
}

async fn check_status(response: Response) -> DirectoryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => {
            error!("Icinga 2 rejected credentials ({}): {}", status, error_text);
            Err(DirectoryError::AuthFailed(error_text))
        }
        404 => Err(DirectoryError::NotFound(error_text)),
        _ => Err(DirectoryError::RequestFailed(format!("{}: {}", status, error_text))),
    }
}

/// Turn a chunked body of newline-delimited JSON into events.
///
/// Undecodable lines yield `Protocol` items and parsing goes on; a
/// transport error yields `StreamError` and ends the stream.
pub fn parse_event_stream<E: std::fmt::Display + Send + 'static>(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
) -> impl futures::Stream<Item = DirectoryResult<Event>> + Send {
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(DirectoryError::StreamError(e.to_string()));
                    return;
                }
            };

            buffer.extend_from_slice(&chunk);

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                if let Some(item) = decode_line(&line) {
                    yield item;
                }
            }
        }

        if let Some(item) = decode_line(&buffer) {
            yield item;
        }
        debug!("Event stream closed by server");
    }
}

fn decode_line(line: &[u8]) -> Option<DirectoryResult<Event>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(Event::decode(text).map_err(|e| {
        warn!("Undecodable event payload: {}", e);
        DirectoryError::Protocol(e.to_string())
    }))
}

#[derive(Serialize)]
struct QueryBody<'a> {
    attrs: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_vars: Option<Value>,
}

#[derive(Serialize)]
struct EventsBody<'a> {
    queue: &'a str,
    types: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

#[derive(Deserialize, Default)]
struct ObjectList {
    #[serde(default)]
    results: Vec<ObjectEntry>,
}

#[derive(Deserialize)]
struct ObjectEntry {
    name: String,
}
