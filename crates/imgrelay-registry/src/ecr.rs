use crate::aws::AwsCredentials;
use crate::sigv4::{self, SigningScope};
use crate::{
    AuthorizationData, ImageIdentifier, RegistryConnector, RegistryControl, RegistryError,
};
use chrono::{DateTime, Utc};
use imgrelay_schema::{ImageTag, RegistryEndpoint, RepositoryDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

const TARGET_PREFIX: &str = "AmazonEC2ContainerRegistry_V20150921";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const SERVICE: &str = "ecr";

/// Environment variable overriding the API base URL; `{region}` is substituted.
pub const ENDPOINT_ENV: &str = "IMGRELAY_ECR_ENDPOINT";

/// Error codes that mean the caller's identity was rejected.
const AUTH_ERROR_CODES: &[&str] = &[
    "AccessDeniedException",
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "IncompleteSignature",
    "ExpiredTokenException",
    "MissingAuthenticationTokenException",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    repository_name: String,
    repository_uri: String,
}

impl From<Repository> for RepositoryDescriptor {
    fn from(r: Repository) -> Self {
        RepositoryDescriptor::new(r.repository_name, r.repository_uri)
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRepositoriesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeRepositoriesResponse {
    #[serde(default)]
    repositories: Vec<Repository>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRepositoryRequest<'a> {
    repository_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateRepositoryResponse {
    repository: Repository,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListImagesRequest<'a> {
    repository_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageId {
    #[serde(default)]
    image_digest: String,
    image_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListImagesResponse {
    #[serde(default)]
    image_ids: Vec<ImageId>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetAuthorizationTokenRequest {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    authorization_token: String,
    /// Seconds since the epoch.
    expires_at: Option<f64>,
    proxy_endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetAuthorizationTokenResponse {
    #[serde(default)]
    authorization_data: Vec<AuthData>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Map a failed API response to a [`RegistryError`].
///
/// `__type` may carry a namespace prefix (`com.amazonaws.ecr#Code`); only the
/// part after `#` is significant.
pub fn classify_error(status: u16, body: &str) -> RegistryError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.kind.as_deref())
        .map(|k| k.rsplit('#').next().unwrap_or(k).to_owned());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.trim().to_owned());

    match code.as_deref() {
        Some("RepositoryNotFoundException") => RegistryError::NotFound(message),
        Some(c) if AUTH_ERROR_CODES.contains(&c) => RegistryError::Auth(format!("{c}: {message}")),
        None if status == 401 || status == 403 => {
            RegistryError::Auth(format!("HTTP {status}: {message}"))
        }
        Some(c) => RegistryError::Unknown {
            code: c.to_owned(),
            message,
        },
        None => RegistryError::Unknown {
            code: format!("HTTP {status}"),
            message,
        },
    }
}

/// ECR control-plane client for one region.
pub struct EcrClient {
    endpoint: RegistryEndpoint,
    base_url: String,
    credentials: Arc<AwsCredentials>,
    agent: ureq::Agent,
}

impl EcrClient {
    pub fn new(endpoint: RegistryEndpoint, credentials: Arc<AwsCredentials>) -> Self {
        let base_url = format!("https://api.ecr.{}.amazonaws.com", endpoint.region);
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            endpoint,
            base_url,
            credentials,
            agent,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_owned();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &str,
        request: &Req,
    ) -> Result<Resp, RegistryError> {
        let payload =
            serde_json::to_vec(request).map_err(|e| RegistryError::Serialization(e.to_string()))?;
        let target = format!("{TARGET_PREFIX}.{operation}");
        let url = format!("{}/", self.base_url);

        let signed = sigv4::signed_headers(
            &SigningScope {
                credentials: &self.credentials,
                region: &self.endpoint.region,
                service: SERVICE,
                time: SystemTime::now(),
            },
            "POST",
            &url,
            &[("Content-Type", CONTENT_TYPE), ("X-Amz-Target", &target)],
            &payload,
        )?;

        tracing::debug!("POST {url} {operation} ({} bytes)", payload.len());
        let mut req = self
            .agent
            .post(&url)
            .header("Content-Type", CONTENT_TYPE)
            .header("X-Amz-Target", &target);
        for (name, value) in &signed {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .send(&payload[..])
            .map_err(|e| RegistryError::Http(format!("{operation} in {}: {e}", self.endpoint)))?;

        let status = resp.status().as_u16();
        let mut body = String::new();
        resp.into_body()
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        if status >= 400 {
            tracing::debug!("{operation} failed with HTTP {status}: {body}");
            return Err(classify_error(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| RegistryError::Serialization(format!("invalid {operation} response: {e}")))
    }
}

impl RegistryControl for EcrClient {
    fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    fn describe_repositories(&self) -> Result<Vec<RepositoryDescriptor>, RegistryError> {
        let mut out = Vec::new();
        let mut next_token = None;
        loop {
            let page: DescribeRepositoriesResponse = self.call(
                "DescribeRepositories",
                &DescribeRepositoriesRequest {
                    repository_names: None,
                    next_token,
                },
            )?;
            out.extend(page.repositories.into_iter().map(RepositoryDescriptor::from));
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(out),
            }
        }
    }

    fn describe_repository(&self, name: &str) -> Result<RepositoryDescriptor, RegistryError> {
        let resp: DescribeRepositoriesResponse = self.call(
            "DescribeRepositories",
            &DescribeRepositoriesRequest {
                repository_names: Some(vec![name.to_owned()]),
                next_token: None,
            },
        )?;
        // Absence is reported only through RepositoryNotFoundException.
        resp.repositories
            .into_iter()
            .find(|r| r.repository_name == name)
            .map(RepositoryDescriptor::from)
            .ok_or_else(|| {
                RegistryError::Serialization(format!(
                    "DescribeRepositories response for '{name}' does not include the repository"
                ))
            })
    }

    fn create_repository(&self, name: &str) -> Result<RepositoryDescriptor, RegistryError> {
        let resp: CreateRepositoryResponse = self.call(
            "CreateRepository",
            &CreateRepositoryRequest {
                repository_name: name,
            },
        )?;
        Ok(resp.repository.into())
    }

    fn list_images(&self, repository: &str) -> Result<Vec<ImageIdentifier>, RegistryError> {
        let mut out = Vec::new();
        let mut next_token = None;
        loop {
            let page: ListImagesResponse = self.call(
                "ListImages",
                &ListImagesRequest {
                    repository_name: repository,
                    next_token,
                },
            )?;
            out.extend(page.image_ids.into_iter().map(|id| ImageIdentifier {
                digest: id.image_digest,
                tag: id.image_tag.map(ImageTag::from),
            }));
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(out),
            }
        }
    }

    fn get_authorization_token(&self) -> Result<AuthorizationData, RegistryError> {
        let resp: GetAuthorizationTokenResponse =
            self.call("GetAuthorizationToken", &GetAuthorizationTokenRequest {})?;
        let data = resp.authorization_data.into_iter().next().ok_or_else(|| {
            RegistryError::Auth(format!("no authorization data issued in {}", self.endpoint))
        })?;
        Ok(AuthorizationData {
            token: data.authorization_token,
            proxy_endpoint: data.proxy_endpoint,
            expires_at: data
                .expires_at
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)),
        })
    }
}

/// Opens [`EcrClient`]s that share one set of AWS credentials.
pub struct EcrConnector {
    credentials: Arc<AwsCredentials>,
    /// Base URL template; `{region}` is replaced per endpoint.
    base_url: Option<String>,
}

impl EcrConnector {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            base_url: None,
        }
    }

    /// Resolve credentials for `profile` (STS calls go to `region`) and
    /// honour [`ENDPOINT_ENV`].
    pub fn from_env(profile: Option<&str>, region: &str) -> Result<Self, RegistryError> {
        let connector = Self::new(AwsCredentials::load(profile, region)?);
        Ok(match std::env::var(ENDPOINT_ENV) {
            Ok(url) if !url.is_empty() => connector.with_base_url(&url),
            _ => connector,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, template: &str) -> Self {
        self.base_url = Some(template.to_owned());
        self
    }
}

impl RegistryConnector for EcrConnector {
    fn connect(
        &self,
        endpoint: &RegistryEndpoint,
    ) -> Result<Box<dyn RegistryControl>, RegistryError> {
        let client = EcrClient::new(endpoint.clone(), Arc::clone(&self.credentials));
        Ok(Box::new(match &self.base_url {
            Some(template) => {
                let url = template.replace("{region}", &endpoint.region);
                client.with_base_url(&url)
            }
            None => client,
        }))
    }
}
