//! HTTP client for the remote project/deployment API
//!
//! [`RemoteApi`] is the contract the state layer consumes. [`HttpApiClient`] implements
//! it over `reqwest` with bearer authentication, a `teamId` query parameter for team
//! scoped calls, typed errors parsed from the `{ "error": { code, message } }` body and
//! exponential-backoff retries for transient failures.

use crate::error::{ApiError, Result};
use crate::models::{
    Check, DeploymentEvent, Environment, FileNode, PlainDeployment, PlainProject, Team, User,
};
use crate::validation::{array_field, decode_item, decode_items};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use mirror_core::config::ApiConfig;
use reqwest::{Client as HttpClient, Response, Url};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Credentials for one call: the access token and, for team-owned resources, the team.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiAuth {
    pub access_token: String,
    pub team_id: Option<String>,
}

impl ApiAuth {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            team_id: None,
        }
    }

    /// Scope the call to a team. Empty ids are ignored.
    pub fn with_team(mut self, team_id: Option<&str>) -> Self {
        self.team_id = team_id.filter(|id| !id.is_empty()).map(str::to_string);
        self
    }
}

/// Ordered query parameters appended to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `key=value&...` with form encoding.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Remote calls consumed by the caches.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get_user(&self, auth: &ApiAuth) -> Result<User>;

    async fn list_teams(&self, auth: &ApiAuth) -> Result<Vec<Team>>;

    async fn list_projects(&self, auth: &ApiAuth) -> Result<Vec<PlainProject>>;

    async fn get_project_by_name_or_id(&self, id_or_name: &str, auth: &ApiAuth) -> Result<PlainProject>;

    async fn list_deployments_by_project_id(
        &self,
        project_id: &str,
        query: &QueryParams,
        auth: &ApiAuth,
    ) -> Result<Vec<PlainDeployment>>;

    async fn get_deployment_by_id(&self, deployment_id: &str, auth: &ApiAuth) -> Result<PlainDeployment>;

    /// Build events of a deployment, oldest first.
    async fn get_deployment_events(&self, deployment_id: &str, auth: &ApiAuth) -> Result<Vec<DeploymentEvent>>;

    /// Output file tree below `base` of the deployment served at `deployment_url`.
    async fn get_deployment_file_tree(
        &self,
        deployment_url: &str,
        base: &str,
        auth: &ApiAuth,
    ) -> Result<Vec<FileNode>>;

    /// File bytes from the base64 JSON endpoint.
    async fn get_deployment_file_content(&self, deployment_id: &str, path: &str, auth: &ApiAuth) -> Result<Vec<u8>>;

    /// File bytes from the legacy binary endpoint.
    async fn get_deployment_file_content_v6(
        &self,
        deployment_id: &str,
        path: &str,
        auth: &ApiAuth,
    ) -> Result<Vec<u8>>;

    async fn list_deployment_checks(&self, deployment_id: &str, auth: &ApiAuth) -> Result<Vec<Check>>;

    async fn pull_project_envs(
        &self,
        project_id: &str,
        environment: Environment,
        auth: &ApiAuth,
    ) -> Result<BTreeMap<String, String>>;
}

/// Configuration for [`HttpApiClient`]
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the REST API
    pub base_url: String,
    /// Base URL of the dashboard, which serves the file-tree endpoint
    pub dashboard_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub deployments_page_limit: u32,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

impl ApiClientConfig {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dashboard_url: "https://vercel.com".to_string(),
            request_timeout_secs: config.request_timeout_secs,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
            deployments_page_limit: config.deployments_page_limit,
        }
    }
}

/// `reqwest` implementation of [`RemoteApi`]
pub struct HttpApiClient {
    client: HttpClient,
    config: ApiClientConfig,
}

impl HttpApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    fn url(&self, base: &str, path: &str, query: &[(&str, &str)], auth: &ApiAuth) -> Result<Url> {
        let mut url = Url::parse(&format!("{base}{path}"))
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid request URL {base}{path}: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Some(team_id) = &auth.team_id {
                pairs.append_pair("teamId", team_id);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn api_url(&self, path: &str, query: &[(&str, &str)], auth: &ApiAuth) -> Result<Url> {
        self.url(&self.config.base_url, path, query, auth)
    }

    async fn send(&self, url: &Url, auth: &ApiAuth) -> Result<Response> {
        trace!("Making a \"GET\" request to \"{}\"", url);
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&auth.access_token)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Turn a non-success response into a typed error.
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json.get("error").or_else(|| json.get("err")).cloned())
            .filter(|error| error.get("code").is_some() && error.get("message").is_some());

        let error = match parsed {
            Some(error) => ApiError::Http {
                status: status.as_u16(),
                code: error.get("code").and_then(Value::as_str).map(str::to_string),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            None => ApiError::http(
                status.as_u16(),
                format!(
                    "Request failed with status code {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or_default()
                ),
            ),
        };
        warn!("{}", error);
        Err(error)
    }

    async fn get_json(&self, url: Url, auth: &ApiAuth) -> Result<Value> {
        let url = &url;
        self.execute_with_retry(move || async move {
            let response = self.send(url, auth).await?;
            let text = response.text().await?;
            serde_json::from_str::<Value>(&text)
                .map_err(|_| ApiError::InvalidResponse("Request responded with invalid JSON".to_string()))
        })
        .await
    }

    /// JSON endpoints other than the array ones always answer with an object.
    async fn get_object(&self, url: Url, auth: &ApiAuth) -> Result<Value> {
        let json = self.get_json(url, auth).await?;
        if json.is_object() {
            Ok(json)
        } else {
            Err(ApiError::InvalidResponse(format!(
                "Request responded with \"{}\" instead of \"object\"",
                json_type(&json)
            )))
        }
    }

    async fn get_array(&self, url: Url, auth: &ApiAuth) -> Result<Vec<Value>> {
        match self.get_json(url, auth).await? {
            Value::Array(items) => Ok(items),
            other => Err(ApiError::InvalidResponse(format!(
                "Request responded with \"{}\" instead of \"array\"",
                json_type(&other)
            ))),
        }
    }

    async fn get_bytes(&self, url: Url, auth: &ApiAuth) -> Result<Vec<u8>> {
        let url = &url;
        self.execute_with_retry(move || async move {
            let response = self.send(url, auth).await?;
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }

    /// Execute request with retry logic
    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Request succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    warn!(
                        "Request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_retries,
                        e
                    );

                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f32(2.0);
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Request failed permanently: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required<T: serde::de::DeserializeOwned>(type_name: &str, value: Value) -> Result<T> {
    decode_item(type_name, value).ok_or_else(|| ApiError::InvalidResponse(format!("Invalid {type_name} in response")))
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl RemoteApi for HttpApiClient {
    async fn get_user(&self, auth: &ApiAuth) -> Result<User> {
        let mut json = self.get_object(self.api_url("/v2/user", &[], auth)?, auth).await?;
        let user = json.get_mut("user").map(Value::take).unwrap_or_default();
        required("User", user)
    }

    async fn list_teams(&self, auth: &ApiAuth) -> Result<Vec<Team>> {
        let mut json = self.get_object(self.api_url("/v2/teams", &[], auth)?, auth).await?;
        Ok(decode_items("Team", array_field(&mut json, "teams")))
    }

    async fn list_projects(&self, auth: &ApiAuth) -> Result<Vec<PlainProject>> {
        let mut json = self.get_object(self.api_url("/v4/projects", &[], auth)?, auth).await?;
        Ok(decode_items("Project", array_field(&mut json, "projects")))
    }

    async fn get_project_by_name_or_id(&self, id_or_name: &str, auth: &ApiAuth) -> Result<PlainProject> {
        let path = format!("/v4/projects/{}", segment(id_or_name));
        let json = self.get_object(self.api_url(&path, &[], auth)?, auth).await?;
        required("Project", json)
    }

    async fn list_deployments_by_project_id(
        &self,
        project_id: &str,
        query: &QueryParams,
        auth: &ApiAuth,
    ) -> Result<Vec<PlainDeployment>> {
        let limit = self.config.deployments_page_limit.to_string();
        let mut pairs = vec![("projectId", project_id), ("limit", limit.as_str())];
        pairs.extend(query.iter());

        let url = self.api_url("/v6/deployments", &pairs, auth)?;
        let mut json = self.get_object(url, auth).await?;
        Ok(decode_items("Deployment", array_field(&mut json, "deployments")))
    }

    async fn get_deployment_by_id(&self, deployment_id: &str, auth: &ApiAuth) -> Result<PlainDeployment> {
        let path = format!("/v13/deployments/{}", segment(deployment_id));
        let json = self.get_object(self.api_url(&path, &[], auth)?, auth).await?;
        required("Deployment", json)
    }

    async fn get_deployment_events(&self, deployment_id: &str, auth: &ApiAuth) -> Result<Vec<DeploymentEvent>> {
        let path = format!("/v3/deployments/{}/events", segment(deployment_id));
        let items = self.get_array(self.api_url(&path, &[], auth)?, auth).await?;
        Ok(decode_items("DeploymentEvent", items))
    }

    async fn get_deployment_file_tree(
        &self,
        deployment_url: &str,
        base: &str,
        auth: &ApiAuth,
    ) -> Result<Vec<FileNode>> {
        let path = format!("/api/file-tree/{deployment_url}");
        let url = self.url(&self.config.dashboard_url, &path, &[("base", base)], auth)?;
        let items = self.get_array(url, auth).await?;
        Ok(decode_items("File", items))
    }

    async fn get_deployment_file_content(&self, deployment_id: &str, path: &str, auth: &ApiAuth) -> Result<Vec<u8>> {
        let endpoint = format!("/v7/deployments/{}/files/get", segment(deployment_id));
        let json = self
            .get_object(self.api_url(&endpoint, &[("path", path)], auth)?, auth)
            .await?;
        let data = json.get("data").and_then(Value::as_str).unwrap_or_default();
        BASE64
            .decode(data)
            .map_err(|e| ApiError::InvalidResponse(format!("File content is not valid base64: {e}")))
    }

    async fn get_deployment_file_content_v6(
        &self,
        deployment_id: &str,
        path: &str,
        auth: &ApiAuth,
    ) -> Result<Vec<u8>> {
        let endpoint = format!("/v6/deployments/{}/files/outputs", segment(deployment_id));
        self.get_bytes(self.api_url(&endpoint, &[("file", path)], auth)?, auth)
            .await
    }

    async fn list_deployment_checks(&self, deployment_id: &str, auth: &ApiAuth) -> Result<Vec<Check>> {
        let path = format!("/v1/deployments/{}/checks", segment(deployment_id));
        let mut json = self.get_object(self.api_url(&path, &[], auth)?, auth).await?;
        Ok(decode_items("Check", array_field(&mut json, "checks")))
    }

    async fn pull_project_envs(
        &self,
        project_id: &str,
        environment: Environment,
        auth: &ApiAuth,
    ) -> Result<BTreeMap<String, String>> {
        let path = format!("/v2/env/pull/{}/{}", segment(project_id), environment);
        let json = self.get_object(self.api_url(&path, &[], auth)?, auth).await?;

        let env = match json.get("env") {
            Some(Value::Object(map)) => map
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(env)
    }
}
