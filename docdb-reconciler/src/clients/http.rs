//! JSON-over-HTTP client for the database control plane.
//!
//! Route mapping:
//! - `GET /clusters/{id}`, `POST /clusters`, `POST /clusters/{id}/modify`,
//!   `POST /clusters/restore`, `DELETE /clusters/{id}`, `POST /clusters/{id}/start`
//! - `GET /instances/{id}`, `POST /instances`, `POST /instances/{id}/modify`,
//!   `DELETE /instances/{id}`
//! - `GET /tags?resource={arn}`, `POST /tags/add`, `POST /tags/remove`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ClusterApi, CreateClusterRequest, CreateInstanceRequest, InstanceApi, ModifyClusterRequest,
    ModifyInstanceRequest, RestoreClusterRequest, TagApi,
};
use crate::error::{RemoteError, RemoteResult};
use crate::model::{ClusterDescription, InstanceDescription, Lookup, Password, Tags};

/// Error body returned by the control plane.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct DeleteClusterQuery<'a> {
    skip_final_snapshot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_snapshot: Option<&'a str>,
}

#[derive(Serialize)]
struct TagsBody<'a> {
    resource: &'a str,
    tags: &'a Tags,
}

#[derive(Serialize)]
struct TagKeysBody<'a> {
    resource: &'a str,
    keys: &'a [String],
}

/// Wire body for a request. Requests serialize the password redacted, so the
/// clear-text value is put back here.
fn wire_body<T: Serialize>(request: &T, password: Option<&Password>) -> RemoteResult<Value> {
    let mut body = serde_json::to_value(request)
        .map_err(|e| RemoteError::permanent("InvalidRequest", e.to_string()))?;
    if let (Some(password), Some(fields)) = (password, body.as_object_mut()) {
        fields.insert(
            "master_password".to_string(),
            Value::String(password.expose().to_string()),
        );
    }
    Ok(body)
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: StatusCode, code: Option<String>, message: String) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Transient(format!("{}: {}", status, message))
        }
        s if s.is_server_error() => RemoteError::Transient(format!("{}: {}", status, message)),
        _ => RemoteError::Permanent {
            code: code.unwrap_or_else(|| status.as_str().to_string()),
            message,
        },
    }
}

fn classify_transport(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RemoteError::Transient(err.to_string())
    } else {
        RemoteError::permanent("Transport", err.to_string())
    }
}

/// Control-plane client over HTTP.
#[derive(Clone)]
pub struct HttpControlPlane {
    endpoint: String,
    client: Client,
}

impl HttpControlPlane {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::permanent("ClientBuild", e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body.message.unwrap_or(text);
        Err(classify_status(status, body.code, message))
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::permanent("InvalidResponse", e.to_string()))
    }

    async fn lookup<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<Lookup<T>> {
        debug!("GET {}", path);
        match self.json(self.client.get(self.url(path))).await {
            Ok(found) => Ok(Lookup::Found(found)),
            Err(RemoteError::NotFound(_)) => Ok(Lookup::Absent),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TagApi for HttpControlPlane {
    async fn list_tags(&self, arn: &str) -> RemoteResult<Tags> {
        self.json(self.client.get(self.url("/tags")).query(&[("resource", arn)]))
            .await
    }

    async fn add_tags(&self, arn: &str, tags: &Tags) -> RemoteResult<()> {
        let body = TagsBody {
            resource: arn,
            tags,
        };
        self.send(self.client.post(self.url("/tags/add")).json(&body))
            .await?;
        Ok(())
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> RemoteResult<()> {
        let body = TagKeysBody {
            resource: arn,
            keys,
        };
        self.send(self.client.post(self.url("/tags/remove")).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for HttpControlPlane {
    async fn describe_cluster(&self, id: &str) -> RemoteResult<Lookup<ClusterDescription>> {
        self.lookup(&format!("/clusters/{}", id)).await
    }

    async fn create_cluster(&self, req: &CreateClusterRequest) -> RemoteResult<ClusterDescription> {
        let body = wire_body(req, req.master_password.as_ref())?;
        self.json(self.client.post(self.url("/clusters")).json(&body))
            .await
    }

    async fn modify_cluster(
        &self,
        id: &str,
        req: &ModifyClusterRequest,
    ) -> RemoteResult<ClusterDescription> {
        let body = wire_body(req, req.master_password.as_ref())?;
        let path = format!("/clusters/{}/modify", id);
        self.json(self.client.post(self.url(&path)).json(&body))
            .await
    }

    async fn restore_cluster_from_snapshot(
        &self,
        req: &RestoreClusterRequest,
    ) -> RemoteResult<ClusterDescription> {
        self.json(self.client.post(self.url("/clusters/restore")).json(req))
            .await
    }

    async fn delete_cluster(&self, id: &str, final_snapshot: Option<&str>) -> RemoteResult<()> {
        let query = DeleteClusterQuery {
            skip_final_snapshot: final_snapshot.is_none(),
            final_snapshot,
        };
        let path = format!("/clusters/{}", id);
        self.send(self.client.delete(self.url(&path)).query(&query))
            .await?;
        Ok(())
    }

    async fn start_cluster(&self, id: &str) -> RemoteResult<()> {
        let path = format!("/clusters/{}/start", id);
        self.send(self.client.post(self.url(&path))).await?;
        Ok(())
    }
}

#[async_trait]
impl InstanceApi for HttpControlPlane {
    async fn describe_instance(&self, id: &str) -> RemoteResult<Lookup<InstanceDescription>> {
        self.lookup(&format!("/instances/{}", id)).await
    }

    async fn create_instance(
        &self,
        req: &CreateInstanceRequest,
    ) -> RemoteResult<InstanceDescription> {
        self.json(self.client.post(self.url("/instances")).json(req))
            .await
    }

    async fn modify_instance(
        &self,
        id: &str,
        req: &ModifyInstanceRequest,
    ) -> RemoteResult<InstanceDescription> {
        let path = format!("/instances/{}/modify", id);
        self.json(self.client.post(self.url(&path)).json(req))
            .await
    }

    async fn delete_instance(&self, id: &str) -> RemoteResult<()> {
        let path = format!("/instances/{}", id);
        self.send(self.client.delete(self.url(&path))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::NOT_FOUND, None, "gone".into()).is_not_found());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, None, "slow down".into()).is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, None, "".into()).is_transient());
        assert_eq!(
            classify_status(
                StatusCode::BAD_REQUEST,
                Some("InvalidParameterValue".into()),
                "bad port".into()
            ),
            RemoteError::permanent("InvalidParameterValue", "bad port")
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, None, "denied".into()),
            RemoteError::permanent("403", "denied")
        );
    }

    #[test]
    fn test_wire_body_carries_clear_password() {
        let req = ModifyClusterRequest {
            master_password: Some(Password::new("s3cret")),
            apply_immediately: true,
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&req).unwrap()["master_password"], "********");

        let json = wire_body(&req, req.master_password.as_ref()).unwrap();
        assert_eq!(json["master_password"], "s3cret");
        assert_eq!(json["apply_immediately"], true);
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let plane = HttpControlPlane::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(plane.url("/clusters/c1"), "http://localhost:8080/clusters/c1");
    }
}
