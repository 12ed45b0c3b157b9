//! S3-compatible HTTP backend (AWS S3, R2, MinIO) with path-style addressing.

use super::sigv4::{self, Credentials};
use super::{ObjectBody, ObjectStore};
use crate::config::AppSecrets;
use crate::error::MirrorError;
use crate::types::RemoteObjectMeta;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::SystemTime;
use tracing::debug;

/// Connection settings for [`HttpObjectStore`].
#[derive(Clone, Default)]
pub struct HttpStoreConfig {
    /// Endpoint URL; `https://s3.<region>.amazonaws.com` when unset.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub key_id: String,
    pub secret_key: String,
}

impl HttpStoreConfig {
    pub fn from_secrets(secrets: &AppSecrets) -> Self {
        Self {
            endpoint: secrets.endpoint.clone().filter(|e| !e.is_empty()),
            bucket: secrets.mirror_bucket.clone(),
            region: secrets.region.clone(),
            key_id: secrets.key_id.clone(),
            secret_key: secrets.secret_key.clone(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    last_modified: String,
    size: u64,
}

/// Object store speaking the S3 REST API.
///
/// Requests are signed with SigV4 when a key pair is configured and sent
/// anonymously otherwise (public buckets).
pub struct HttpObjectStore {
    client: Client,
    scheme: String,
    authority: String,
    base_path: String,
    bucket: String,
    credentials: Option<Credentials>,
    label: String,
}

impl HttpObjectStore {
    /// Validates the settings and builds the HTTP client.
    pub fn new(config: HttpStoreConfig) -> Result<Self, MirrorError> {
        if config.bucket.is_empty() {
            return Err(MirrorError::Store("no mirror bucket configured".to_string()));
        }
        let endpoint = match config.endpoint {
            Some(endpoint) => endpoint,
            None if !config.region.is_empty() => {
                format!("https://s3.{}.amazonaws.com", config.region)
            }
            None => {
                return Err(MirrorError::Store(
                    "neither an endpoint nor a region is configured".to_string(),
                ))
            }
        };
        let url = Url::parse(&endpoint)
            .map_err(|e| MirrorError::Store(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| MirrorError::Store(format!("endpoint {} has no host", endpoint)))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let credentials = if config.key_id.is_empty() || config.secret_key.is_empty() {
            None
        } else {
            Some(Credentials {
                key_id: config.key_id,
                secret_key: config.secret_key,
                // R2 and MinIO accept any region; "auto" is R2's convention.
                region: if config.region.is_empty() {
                    "auto".to_string()
                } else {
                    config.region
                },
            })
        };

        Ok(Self {
            client: Client::builder().build()?,
            scheme: url.scheme().to_string(),
            label: format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
            base_path: url.path().trim_end_matches('/').to_string(),
            authority,
            bucket: config.bucket,
            credentials,
        })
    }

    fn object_path(&self, key: &str) -> String {
        let mut path = format!("{}/{}", self.base_path, sigv4::uri_encode(&self.bucket, true));
        if !key.is_empty() {
            path.push('/');
            path.push_str(&sigv4::uri_encode(key, false));
        }
        path
    }

    async fn send_get(
        &self,
        canonical_uri: &str,
        query_pairs: &[(&str, &str)],
    ) -> Result<reqwest::Response, MirrorError> {
        let query = sigv4::canonical_query(query_pairs);
        let mut raw = format!("{}://{}{}", self.scheme, self.authority, canonical_uri);
        if !query.is_empty() {
            raw.push('?');
            raw.push_str(&query);
        }
        let url =
            Url::parse(&raw).map_err(|e| MirrorError::Store(format!("bad url {}: {}", raw, e)))?;

        let mut request = self.client.get(url);
        if let Some(credentials) = &self.credentials {
            let headers = sigv4::sign_request(
                credentials,
                "GET",
                &self.authority,
                canonical_uri,
                &query,
                SystemTime::now(),
            )?;
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        debug!("GET {}", raw);
        Ok(request.send().await?)
    }
}

async fn status_error(what: &str, response: reqwest::Response) -> MirrorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    MirrorError::Store(format!("{} failed: HTTP {} {}", what, status, snippet))
}

#[async_trait::async_trait]
impl ObjectStore for HttpObjectStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObjectMeta>, MirrorError> {
        let canonical_uri = self.object_path("");
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut pairs = vec![("list-type", "2")];
            if let Some(token) = token.as_deref() {
                pairs.push(("continuation-token", token));
            }
            let response = self.send_get(&canonical_uri, &pairs).await?;
            if !response.status().is_success() {
                return Err(status_error(&format!("Listing bucket {}", self.bucket), response).await);
            }

            let page: ListBucketResult = quick_xml::de::from_str(&response.text().await?)?;
            for item in page.contents {
                let last_modified = humantime::parse_rfc3339(&item.last_modified).map_err(|e| {
                    MirrorError::Store(format!(
                        "bad LastModified {:?} for {}: {}",
                        item.last_modified, item.key, e
                    ))
                })?;
                objects.push(RemoteObjectMeta {
                    key: item.key,
                    last_modified,
                    size: item.size,
                });
            }

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(next)) => token = Some(next),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn get_object(&self, key: &str) -> Result<ObjectBody, MirrorError> {
        let response = self.send_get(&self.object_path(key), &[]).await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(MirrorError::Store(format!("NoSuchKey: {}", key)));
            }
            _ => return Err(status_error(&format!("Fetching {}", key), response).await),
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        Ok(ObjectBody {
            etag,
            stream: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(MirrorError::from))
                .boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HttpStoreConfig {
        HttpStoreConfig {
            bucket: "sig-mirror".to_string(),
            region: "us-east-1".to_string(),
            ..HttpStoreConfig::default()
        }
    }

    #[test]
    fn test_default_endpoint_from_region() {
        let store = HttpObjectStore::new(config()).unwrap();
        assert_eq!(store.authority, "s3.us-east-1.amazonaws.com");
        assert_eq!(store.object_path("daily.cld.gz"), "/sig-mirror/daily.cld.gz");
        assert!(store.credentials.is_none());
    }

    #[test]
    fn test_custom_endpoint_keeps_port_and_path() {
        let store = HttpObjectStore::new(HttpStoreConfig {
            endpoint: Some("http://127.0.0.1:9000/storage/".to_string()),
            key_id: "id".to_string(),
            secret_key: "secret".to_string(),
            ..config()
        })
        .unwrap();
        assert_eq!(store.authority, "127.0.0.1:9000");
        assert_eq!(store.object_path("a b.cvd"), "/storage/sig-mirror/a%20b.cvd");
        assert!(store.credentials.is_some());
    }

    #[test]
    fn test_missing_bucket_or_region_is_rejected() {
        let no_bucket = HttpStoreConfig {
            bucket: String::new(),
            ..config()
        };
        assert!(HttpObjectStore::new(no_bucket).is_err());

        let no_region = HttpStoreConfig {
            region: String::new(),
            ..config()
        };
        assert!(HttpObjectStore::new(no_region).is_err());
    }

    #[test]
    fn test_parse_list_bucket_result() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>sig-mirror</Name>
  <Prefix></Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <Contents>
    <Key>daily.cld.gz</Key>
    <LastModified>2020-06-01T12:00:00.000Z</LastModified>
    <ETag>"abc"</ETag>
    <Size>500</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>daily.cld_checksum.txt</Key>
    <LastModified>2020-06-01T12:00:01.000Z</LastModified>
    <ETag>"def"</ETag>
    <Size>64</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <NextContinuationToken>token-2</NextContinuationToken>
</ListBucketResult>"#;

        let page: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.next_continuation_token.as_deref(), Some("token-2"));
        assert_eq!(page.contents.len(), 2);
        assert_eq!(page.contents[0].key, "daily.cld.gz");
        assert_eq!(page.contents[0].size, 500);
        assert!(humantime::parse_rfc3339(&page.contents[1].last_modified).is_ok());
    }
}
