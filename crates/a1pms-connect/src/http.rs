//! HTTP adapters for the supported A1 dialects

use crate::client::A1Client;
use crate::error::{A1Error, A1Result};
use a1pms_core_registry::{A1Dialect, Policy};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, trace};

/// A1 client speaking one dialect to one node over HTTP.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct HttpA1Client {
    http: Client,
    node_id: String,
    base_url: String,
    dialect: A1Dialect,
}

impl HttpA1Client {
    pub fn new(
        http: Client,
        node_id: impl Into<String>,
        base_url: impl Into<String>,
        dialect: A1Dialect,
    ) -> Self {
        Self {
            http,
            node_id: node_id.into(),
            base_url: base_url.into(),
            dialect,
        }
    }

    pub fn dialect(&self) -> A1Dialect {
        self.dialect
    }

    fn prefix(&self) -> &'static [&'static str] {
        match self.dialect {
            A1Dialect::StdV2 => &["A1-P", "v2"],
            A1Dialect::OscV1 => &["a1-p"],
        }
    }

    fn schema_field(&self) -> &'static str {
        match self.dialect {
            A1Dialect::StdV2 => "policySchema",
            A1Dialect::OscV1 => "create_schema",
        }
    }

    /// Base URL plus the dialect prefix plus `segments`, each segment escaped
    pub(crate) fn url(&self, segments: &[&str]) -> A1Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            A1Error::protocol(
                &self.node_id,
                format!("invalid base URL '{}': {}", self.base_url, e),
            )
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                A1Error::protocol(
                    &self.node_id,
                    format!("base URL '{}' cannot carry a path", self.base_url),
                )
            })?;
            path.pop_if_empty();
            path.extend(self.prefix());
            path.extend(segments);
        }
        Ok(url)
    }

    async fn check(&self, response: Response) -> A1Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(A1Error::Status {
            node_id: self.node_id.clone(),
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json(&self, url: Url) -> A1Result<Value> {
        trace!(node_id = %self.node_id, url = %url, "GET");
        let response = self.http.get(url).send().await?;
        let response = self.check(response).await?;
        Ok(response.json::<Value>().await?)
    }

    fn parse_ids(&self, value: Value) -> A1Result<Vec<String>> {
        let Value::Array(items) = value else {
            return Err(A1Error::protocol(
                &self.node_id,
                format!("expected a JSON array of ids, got {}", value),
            ));
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(id) => Ok(id),
                Value::Number(id) => Ok(id.to_string()),
                other => Err(A1Error::protocol(
                    &self.node_id,
                    format!("unexpected id {}", other),
                )),
            })
            .collect()
    }

    async fn policy_ids_of_type(&self, type_id: &str) -> A1Result<Vec<String>> {
        let value = self
            .get_json(self.url(&["policytypes", type_id, "policies"])?)
            .await?;
        self.parse_ids(value)
    }

    /// Every `(type id, policy id)` pair on the node
    async fn all_policies(&self) -> A1Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for type_id in self.get_policy_type_identities().await? {
            for policy_id in self.policy_ids_of_type(&type_id).await? {
                pairs.push((type_id.clone(), policy_id));
            }
        }
        Ok(pairs)
    }

    async fn delete_by_id(&self, type_id: &str, policy_id: &str) -> A1Result<String> {
        let url = self.url(&["policytypes", type_id, "policies", policy_id])?;
        trace!(node_id = %self.node_id, url = %url, "DELETE");
        let response = self.http.delete(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(node_id = %self.node_id, policy_id = %policy_id, "Policy already absent on node");
            return Ok(String::new());
        }
        let response = self.check(response).await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl A1Client for HttpA1Client {
    async fn get_policy_type_identities(&self) -> A1Result<Vec<String>> {
        let value = self.get_json(self.url(&["policytypes"])?).await?;
        self.parse_ids(value)
    }

    async fn get_policy_identities(&self) -> A1Result<Vec<String>> {
        Ok(self
            .all_policies()
            .await?
            .into_iter()
            .map(|(_, policy_id)| policy_id)
            .collect())
    }

    async fn get_policy_type_schema(&self, type_id: &str) -> A1Result<String> {
        let value = self.get_json(self.url(&["policytypes", type_id])?).await?;
        let field = self.schema_field();
        match value.get(field) {
            Some(schema) => Ok(schema.to_string()),
            None => Err(A1Error::protocol(
                &self.node_id,
                format!("policy type {} has no '{}' field", type_id, field),
            )),
        }
    }

    async fn put_policy(&self, policy: &Policy) -> A1Result<String> {
        let url = self.url(&["policytypes", policy.type_id(), "policies", &policy.id])?;
        trace!(node_id = %self.node_id, url = %url, "PUT");
        let response = self
            .http
            .put(url)
            .header(CONTENT_TYPE, "application/json")
            .body(policy.json.clone())
            .send()
            .await?;
        let response = self.check(response).await?;
        Ok(response.text().await?)
    }

    async fn delete_policy(&self, policy: &Policy) -> A1Result<String> {
        self.delete_by_id(policy.type_id(), &policy.id).await
    }

    fn delete_all_policies(&self) -> BoxStream<'_, A1Result<String>> {
        stream::once(self.all_policies())
            .map(move |listing| match listing {
                Ok(pairs) => stream::iter(pairs)
                    .then(move |(type_id, policy_id)| async move {
                        self.delete_by_id(&type_id, &policy_id)
                            .await
                            .map(|_| policy_id)
                    })
                    .boxed(),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str, dialect: A1Dialect) -> HttpA1Client {
        HttpA1Client::new(Client::new(), "ric1", base_url, dialect)
    }

    #[test]
    fn test_std_v2_urls() {
        let c = client("http://ric1:8085", A1Dialect::StdV2);
        assert_eq!(
            c.url(&["policytypes"]).unwrap().as_str(),
            "http://ric1:8085/A1-P/v2/policytypes"
        );
        assert_eq!(
            c.url(&["policytypes", "t1", "policies", "p1"]).unwrap().as_str(),
            "http://ric1:8085/A1-P/v2/policytypes/t1/policies/p1"
        );
    }

    #[test]
    fn test_osc_v1_urls_and_trailing_slash() {
        let c = client("http://ric1:8085/", A1Dialect::OscV1);
        assert_eq!(
            c.url(&["policytypes", "20008"]).unwrap().as_str(),
            "http://ric1:8085/a1-p/policytypes/20008"
        );
    }

    #[test]
    fn test_ids_are_escaped() {
        let c = client("http://ric1", A1Dialect::StdV2);
        let url = c.url(&["policytypes", "t1", "policies", "a/b c"]).unwrap();
        assert_eq!(url.path(), "/A1-P/v2/policytypes/t1/policies/a%2Fb%20c");
    }

    #[test]
    fn test_invalid_base_url() {
        let c = client("not a url", A1Dialect::StdV2);
        assert!(matches!(c.url(&["policytypes"]), Err(A1Error::Protocol { .. })));
    }

    #[test]
    fn test_parse_ids_accepts_numbers() {
        let c = client("http://ric1", A1Dialect::OscV1);
        let ids = c.parse_ids(serde_json::json!([20008, "t2"])).unwrap();
        assert_eq!(ids, vec!["20008", "t2"]);
        assert!(c.parse_ids(serde_json::json!({"ids": []})).is_err());
        assert!(c.parse_ids(serde_json::json!([null])).is_err());
    }
}
