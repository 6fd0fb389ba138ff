use super::traits::RegistryClient;
use crate::application::errors::VulnerabilityError;
use crate::config::NvdConfig;
use crate::domain::{CpeName, RawRegistryRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Response envelope of `GET /cves/2.0`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdResponse {
    #[serde(default)]
    total_results: Option<u64>,
    #[serde(default)]
    vulnerabilities: Vec<NvdItem>,
}

#[derive(Debug, Deserialize)]
struct NvdItem {
    #[serde(default)]
    cve: RawRegistryRecord,
}

/// Client for the NVD CVE API 2.0
pub struct NvdClient {
    client: Client,
    base_url: String,
    /// Optional NVD API key (higher rate limits when present)
    api_key: Option<String>,
}

impl NvdClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, VulnerabilityError> {
        let client = Client::builder()
            .user_agent(concat!("sbomvex/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let api_key = api_key.filter(|k| !k.trim().is_empty());

        tracing::info!(
            base_url = %base_url,
            has_api_key = api_key.is_some(),
            "Initialized NvdClient"
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &NvdConfig) -> Result<Self, VulnerabilityError> {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    async fn query(
        &self,
        param: &str,
        value: &str,
    ) -> Result<Vec<RawRegistryRecord>, VulnerabilityError> {
        let url = format!("{}/cves/2.0", self.base_url);

        let mut request = self.client.get(&url).query(&[(param, value)]);
        if let Some(key) = &self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VulnerabilityError::Http {
                status,
                message: format!("NVD API error: {}", error_text),
            });
        }

        let body = response.bytes().await?;
        let parsed: NvdResponse = serde_json::from_slice(&body).map_err(|e| {
            VulnerabilityError::MalformedUpstreamResponse {
                message: format!("NVD response for {}={}: {}", param, value, e),
            }
        })?;

        tracing::debug!(
            param = param,
            value = value,
            total_results = parsed.total_results.unwrap_or(0),
            returned = parsed.vulnerabilities.len(),
            "NVD query completed"
        );

        Ok(parsed.vulnerabilities.into_iter().map(|item| item.cve).collect())
    }
}

#[async_trait]
impl RegistryClient for NvdClient {
    async fn fetch_by_cpe(
        &self,
        cpe: &CpeName,
    ) -> Result<Vec<RawRegistryRecord>, VulnerabilityError> {
        self.query("cpeName", cpe.as_str()).await
    }

    async fn fetch_by_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<RawRegistryRecord>, VulnerabilityError> {
        self.query("keywordSearch", keyword).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const CPE: &str = "cpe:2.3:a:apache:log4j:2.14.1:*:*:*:*:*:*:*";

    fn cpe() -> CpeName {
        CpeName::new(CPE).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_by_cpe_success() {
        let mut server = Server::new_async().await;

        let mock_response = json!({
            "resultsPerPage": 1,
            "startIndex": 0,
            "totalResults": 1,
            "format": "NVD_CVE",
            "version": "2.0",
            "vulnerabilities": [{
                "cve": {
                    "id": "CVE-2021-44228",
                    "sourceIdentifier": "security@apache.org",
                    "descriptions": [{"lang": "en", "value": "Apache Log4j2 JNDI features"}],
                    "metrics": {
                        "cvssMetricV31": [{
                            "source": "nvd@nist.gov",
                            "type": "Primary",
                            "cvssData": {"version": "3.1", "baseScore": 10.0, "baseSeverity": "CRITICAL"},
                            "exploitabilityScore": 3.9,
                            "impactScore": 6.0
                        }]
                    }
                }
            }]
        });

        let mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::UrlEncoded("cpeName".into(), CPE.into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(mock_response.to_string())
            .expect(1)
            .create_async()
            .await;

        let client = NvdClient::new(server.url(), None).unwrap();
        let records = client.fetch_by_cpe(&cpe()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "CVE-2021-44228");
        assert_eq!(
            records[0].metrics.cvss_metric_v31[0].cvss_data.base_score,
            Some(10.0)
        );
    }

    #[tokio::test]
    async fn test_fetch_by_keyword_sends_api_key() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::UrlEncoded("keywordSearch".into(), "CVE-2021-44228".into()))
            .match_header("apiKey", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"totalResults": 0, "vulnerabilities": []}).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = NvdClient::new(server.url(), Some("secret".to_string())).unwrap();
        let records = client.fetch_by_keyword("CVE-2021-44228").await.unwrap();

        mock.assert_async().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_missing_vulnerabilities_key_means_no_findings() {
        let mut server = Server::new_async().await;

        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"totalResults": 0}).to_string())
            .create_async()
            .await;

        let client = NvdClient::new(server.url(), None).unwrap();
        assert!(client.fetch_by_cpe(&cpe()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = Server::new_async().await;

        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let client = NvdClient::new(server.url(), None).unwrap();
        match client.fetch_by_cpe(&cpe()).await {
            Err(VulnerabilityError::Http { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected HTTP error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_malformed() {
        let mut server = Server::new_async().await;

        let _mock = server
            .mock("GET", "/cves/2.0")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = NvdClient::new(server.url(), None).unwrap();
        assert!(matches!(
            client.fetch_by_cpe(&cpe()).await,
            Err(VulnerabilityError::MalformedUpstreamResponse { .. })
        ));
    }
}
