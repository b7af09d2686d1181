use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::snapshot::{CampaignId, CustomerId};

/// Largest operation batch the campaigns:mutate endpoint accepts.
pub const MAX_MUTATE_BATCH: usize = 1000;

const GOOGLE_ADS_API_URL: &str = "https://googleads.googleapis.com/v17";

const CUSTOMER_CLIENT_QUERY: &str = "SELECT customer_client.id FROM customer_client";

/// Only campaigns that are safe to toggle programmatically: enabled, not an
/// experiment arm, and not in a channel type (video, local inventory) that
/// policy excludes from bulk mutation.
const ACTIVE_CAMPAIGN_QUERY: &str = "\
    SELECT campaign.id \
    FROM campaign \
    WHERE \
    campaign.status = 'ENABLED' \
    AND campaign.experiment_type = 'BASE' \
    AND campaign.advertising_channel_type NOT IN ('VIDEO', 'LOCAL')";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Enabled,
    Paused,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Enabled => "ENABLED",
            CampaignStatus::Paused => "PAUSED",
        }
    }
}

/// The three remote operations the pipelines consume. Everything behind it
/// (pagination, wire format, auth headers) is the implementation's business.
#[async_trait]
pub trait AdsGateway: Send + Sync {
    /// List every sub-account under the organization's login customer.
    async fn list_customer_ids(&self) -> Result<Vec<CustomerId>>;

    /// List the ids of one customer's active, mutation-eligible campaigns.
    async fn list_active_campaigns(&self, customer_id: CustomerId) -> Result<Vec<CampaignId>>;

    /// Set every campaign in the batch (at most [`MAX_MUTATE_BATCH`]) to the
    /// given status. With `validate_only` the server checks the request but
    /// changes nothing.
    async fn set_campaign_status(
        &self,
        customer_id: CustomerId,
        campaign_ids: &[CampaignId],
        status: CampaignStatus,
        validate_only: bool,
    ) -> Result<()>;
}

/// Google Ads REST API implementation of the gateway.
pub struct GoogleAdsClient {
    http: reqwest::Client,
    api_url: String,
    developer_token: String,
    login_customer_id: String,
    access_token: String,
}

impl GoogleAdsClient {
    pub fn new(credentials: &Credentials, access_token: String) -> Self {
        GoogleAdsClient {
            http: reqwest::Client::new(),
            api_url: GOOGLE_ADS_API_URL.to_string(),
            developer_token: credentials.org.developer_token.clone(),
            login_customer_id: credentials.org.login_customer_id.clone(),
            access_token,
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .header("developer-token", &self.developer_token)
            .header("login-customer-id", &self.login_customer_id)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !response.status().is_success() {
            bail!(
                "google ads request failed ({}): {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode response from {url}"))
    }

    /// Run a GAQL query via searchStream and flatten the streamed chunks.
    async fn search<T: DeserializeOwned>(&self, customer_id: &str, query: &str) -> Result<Vec<T>> {
        let url = format!(
            "{}/customers/{}/googleAds:searchStream",
            self.api_url, customer_id
        );
        let chunks: Vec<SearchChunk<T>> = self.post(&url, &SearchRequest { query }).await?;
        Ok(chunks.into_iter().flat_map(|chunk| chunk.results).collect())
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchChunk<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerClientRow {
    customer_client: IdField,
}

#[derive(Debug, Deserialize)]
struct CampaignRow {
    campaign: IdField,
}

// The REST API encodes int64 fields as JSON strings.
#[derive(Debug, Deserialize)]
struct IdField {
    id: String,
}

impl IdField {
    fn parse(&self) -> Result<u64> {
        self.id
            .parse()
            .with_context(|| format!("unparseable id {:?}", self.id))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutateCampaignsRequest {
    operations: Vec<CampaignOperation>,
    validate_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CampaignOperation {
    update_mask: &'static str,
    update: CampaignUpdate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CampaignUpdate {
    resource_name: String,
    status: &'static str,
}

fn campaign_operation(
    customer_id: CustomerId,
    campaign_id: CampaignId,
    status: CampaignStatus,
) -> CampaignOperation {
    CampaignOperation {
        update_mask: "status",
        update: CampaignUpdate {
            resource_name: format!("customers/{customer_id}/campaigns/{campaign_id}"),
            status: status.as_str(),
        },
    }
}

#[async_trait]
impl AdsGateway for GoogleAdsClient {
    async fn list_customer_ids(&self) -> Result<Vec<CustomerId>> {
        let rows: Vec<CustomerClientRow> = self
            .search(&self.login_customer_id, CUSTOMER_CLIENT_QUERY)
            .await?;
        rows.iter().map(|row| row.customer_client.parse()).collect()
    }

    async fn list_active_campaigns(&self, customer_id: CustomerId) -> Result<Vec<CampaignId>> {
        let rows: Vec<CampaignRow> = self
            .search(&customer_id.to_string(), ACTIVE_CAMPAIGN_QUERY)
            .await?;
        rows.iter().map(|row| row.campaign.parse()).collect()
    }

    async fn set_campaign_status(
        &self,
        customer_id: CustomerId,
        campaign_ids: &[CampaignId],
        status: CampaignStatus,
        validate_only: bool,
    ) -> Result<()> {
        let request = MutateCampaignsRequest {
            operations: campaign_ids
                .iter()
                .map(|&campaign_id| campaign_operation(customer_id, campaign_id, status))
                .collect(),
            validate_only,
        };
        let url = format!("{}/customers/{}/campaigns:mutate", self.api_url, customer_id);
        let _: serde_json::Value = self.post(&url, &request).await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::{AdsGateway, CampaignStatus};
    use crate::snapshot::{CampaignId, CustomerId};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MutateCall {
        pub customer_id: CustomerId,
        pub campaign_ids: Vec<CampaignId>,
        pub status: CampaignStatus,
        pub validate_only: bool,
    }

    /// In-memory gateway for pipeline tests: canned listings, optional
    /// per-customer failures, and a record of every mutate call.
    #[derive(Debug, Default)]
    pub struct FakeGateway {
        pub customers: Vec<CustomerId>,
        pub campaigns: HashMap<CustomerId, Vec<CampaignId>>,
        pub fail_listing_for: HashSet<CustomerId>,
        pub fail_mutation_for: HashSet<CustomerId>,
        pub mutations: Mutex<Vec<MutateCall>>,
    }

    impl FakeGateway {
        pub fn mutate_calls(&self) -> Vec<MutateCall> {
            self.mutations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AdsGateway for FakeGateway {
        async fn list_customer_ids(&self) -> Result<Vec<CustomerId>> {
            Ok(self.customers.clone())
        }

        async fn list_active_campaigns(&self, customer_id: CustomerId) -> Result<Vec<CampaignId>> {
            if self.fail_listing_for.contains(&customer_id) {
                return Err(anyhow!("listing failed for customer {customer_id}"));
            }
            Ok(self.campaigns.get(&customer_id).cloned().unwrap_or_default())
        }

        async fn set_campaign_status(
            &self,
            customer_id: CustomerId,
            campaign_ids: &[CampaignId],
            status: CampaignStatus,
            validate_only: bool,
        ) -> Result<()> {
            if self.fail_mutation_for.contains(&customer_id) {
                return Err(anyhow!("mutation rejected for customer {customer_id}"));
            }
            self.mutations.lock().unwrap().push(MutateCall {
                customer_id,
                campaign_ids: campaign_ids.to_vec(),
                status,
                validate_only,
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn campaign_operation_builds_resource_name() {
        let op = campaign_operation(123, 456, CampaignStatus::Paused);
        assert_eq!(op.update.resource_name, "customers/123/campaigns/456");
        assert_eq!(op.update.status, "PAUSED");
        assert_eq!(op.update_mask, "status");
    }

    #[test]
    fn mutate_request_serializes_camel_case() {
        let request = MutateCampaignsRequest {
            operations: vec![campaign_operation(1, 2, CampaignStatus::Enabled)],
            validate_only: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["validateOnly"], true);
        assert_eq!(json["operations"][0]["updateMask"], "status");
        assert_eq!(
            json["operations"][0]["update"]["resourceName"],
            "customers/1/campaigns/2"
        );
        assert_eq!(json["operations"][0]["update"]["status"], "ENABLED");
    }

    #[test]
    fn search_chunks_flatten_and_parse() {
        let body = r#"[
            {"results": [{"customerClient": {"id": "111"}}]},
            {},
            {"results": [{"customerClient": {"id": "222"}}]}
        ]"#;
        let chunks: Vec<SearchChunk<CustomerClientRow>> = serde_json::from_str(body).unwrap();
        let ids: Vec<u64> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.results)
            .map(|row| row.customer_client.parse().unwrap())
            .collect();
        assert_eq!(ids, vec![111, 222]);
    }

    #[test]
    fn active_campaign_query_excludes_protected_channels() {
        assert!(ACTIVE_CAMPAIGN_QUERY.contains("campaign.status = 'ENABLED'"));
        assert!(ACTIVE_CAMPAIGN_QUERY.contains("experiment_type = 'BASE'"));
        assert!(ACTIVE_CAMPAIGN_QUERY.contains("NOT IN ('VIDEO', 'LOCAL')"));
    }
}
