use serde::{Deserialize, Serialize};

use crate::store::Digest;

pub type CustomerId = u64;
pub type CampaignId = u64;

/// One customer's eligible campaign ids at collection time. Built once,
/// persisted, never edited; a new pause cycle re-collects or re-loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSet {
    pub campaign_ids: Vec<CampaignId>,
    pub customer_id: CustomerId,
}

impl CampaignSet {
    /// Campaign ids are stored sorted ascending with duplicates removed,
    /// so structurally identical sets serialize to identical bytes.
    pub fn new(customer_id: CustomerId, mut campaign_ids: Vec<CampaignId>) -> Self {
        campaign_ids.sort_unstable();
        campaign_ids.dedup();
        CampaignSet {
            campaign_ids,
            customer_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.campaign_ids.is_empty()
    }
}

/// The output handle of a collection run: one digest per collected customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSetIndex {
    pub campaign_sets: Vec<Digest>,
}

impl CampaignSetIndex {
    pub fn new(mut campaign_sets: Vec<Digest>) -> Self {
        campaign_sets.sort();
        CampaignSetIndex { campaign_sets }
    }
}
