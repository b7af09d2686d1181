use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Args;

use crate::args::BaseArgs;
use crate::auth;
use crate::config::AppPaths;
use crate::gateway::{AdsGateway, GoogleAdsClient};
use crate::pool::run_workers;
use crate::progress::ProgressMonitor;
use crate::snapshot::{CampaignSet, CampaignSetIndex};
use crate::store::{BlobStore, Digest};

#[derive(Debug, Clone, Args)]
pub struct CollectArgs {}

pub async fn run(base: BaseArgs, _args: CollectArgs, paths: &AppPaths) -> Result<()> {
    let credentials = auth::load_credentials(paths).await?;
    let access_token = auth::fetch_access_token(&credentials).await?;
    let gateway = Arc::new(GoogleAdsClient::new(&credentials, access_token));
    let store = BlobStore::new(paths.blob_dir.clone());

    collect(gateway, &store, base.workers, base.verbose).await?;
    Ok(())
}

/// Snapshot every customer's active campaigns into the blob store and commit
/// one index blob referencing them all. Returns the index digest — the
/// handle an operator replays a pause/unpause from.
pub async fn collect<G>(
    gateway: Arc<G>,
    store: &BlobStore,
    workers: usize,
    verbose: bool,
) -> Result<Digest>
where
    G: AdsGateway + 'static,
{
    println!("getting customer ids...");
    let customer_ids = gateway
        .list_customer_ids()
        .await
        .context("failed to list customers under the organization account")?;
    println!("found {} customer(s)", customer_ids.len());

    println!("getting campaign ids...");
    let monitor = ProgressMonitor::start(customer_ids.len() as u64);
    let digests: Arc<Mutex<Vec<Digest>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let gateway = Arc::clone(&gateway);
        let store = store.clone();
        let digests = Arc::clone(&digests);
        let progress = monitor.handle();
        run_workers(workers, customer_ids, move |customer_id| {
            let gateway = Arc::clone(&gateway);
            let store = store.clone();
            let digests = Arc::clone(&digests);
            let progress = progress.clone();
            async move {
                let campaign_ids = gateway.list_active_campaigns(customer_id).await?;
                let campaign_set = CampaignSet::new(customer_id, campaign_ids);
                let found = campaign_set.campaign_ids.len();
                let digest = store.put(&campaign_set)?;
                digests
                    .lock()
                    .unwrap_or_else(|err| err.into_inner())
                    .push(digest);
                if verbose {
                    println!("found {found} campaign(s) for customer {customer_id}");
                }
                progress.customers(1);
                progress.campaigns(found as u64);
                Ok(())
            }
        })
        .await;
    }

    monitor.finish().await;

    let digests = Arc::into_inner(digests)
        .map(|m| m.into_inner().unwrap_or_else(|err| err.into_inner()))
        .unwrap_or_default();
    let index = CampaignSetIndex::new(digests);
    let index_digest = store.put(&index)?;
    println!("committed campaign sets {index_digest}");

    Ok(index_digest)
}
