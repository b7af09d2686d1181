use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::args::BaseArgs;
use crate::auth;
use crate::collect;
use crate::config::AppPaths;
use crate::gateway::{AdsGateway, CampaignStatus, GoogleAdsClient, MAX_MUTATE_BATCH};
use crate::pool::run_workers;
use crate::progress::{ProgressHandle, ProgressMonitor, ProgressTotals};
use crate::snapshot::{CampaignSet, CampaignSetIndex};
use crate::store::{BlobStore, Digest};
use crate::ui;

#[derive(Debug, Clone, Args)]
pub struct PauseArgs {
    /// Actually perform the mutations
    #[arg(long)]
    pub no_dry_run: bool,

    /// Use CAMPAIGN-SETS for pausing (collected fresh when omitted)
    #[arg(value_name = "CAMPAIGN-SETS")]
    pub campaign_sets: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct UnpauseArgs {
    /// Actually perform the mutations
    #[arg(long)]
    pub no_dry_run: bool,

    /// Use CAMPAIGN-SETS for unpausing (the hash printed when pausing)
    #[arg(value_name = "CAMPAIGN-SETS")]
    pub campaign_sets: String,
}

pub async fn run_pause(base: BaseArgs, args: PauseArgs, paths: &AppPaths) -> Result<()> {
    run_mutation(
        base,
        paths,
        args.no_dry_run,
        args.campaign_sets,
        CampaignStatus::Paused,
    )
    .await
}

pub async fn run_unpause(base: BaseArgs, args: UnpauseArgs, paths: &AppPaths) -> Result<()> {
    run_mutation(
        base,
        paths,
        args.no_dry_run,
        Some(args.campaign_sets),
        CampaignStatus::Enabled,
    )
    .await
}

async fn run_mutation(
    base: BaseArgs,
    paths: &AppPaths,
    no_dry_run: bool,
    campaign_sets: Option<String>,
    status: CampaignStatus,
) -> Result<()> {
    if no_dry_run {
        if !ui::confirm_live_run()? {
            println!("alright, that was close!");
            bail!("live run not confirmed");
        }
    } else {
        println!("*** THIS IS A DRY RUN ***");
        println!("to perform a non-dry run, supply --no-dry-run");
    }

    let credentials = auth::load_credentials(paths).await?;
    let access_token = auth::fetch_access_token(&credentials).await?;
    let gateway = Arc::new(GoogleAdsClient::new(&credentials, access_token));
    let store = BlobStore::new(paths.blob_dir.clone());

    let index_digest = match campaign_sets {
        Some(raw) => raw
            .parse::<Digest>()
            .context("CAMPAIGN-SETS is not a valid campaign set id")?,
        None => collect::collect(Arc::clone(&gateway), &store, base.workers, base.verbose).await?,
    };

    pause_unpause(
        gateway,
        &store,
        &index_digest,
        status,
        !no_dry_run,
        base.workers,
        base.verbose,
    )
    .await?;

    if status == CampaignStatus::Paused {
        println!("you can unpause by running");
        println!("adstop unpause {index_digest}");
    }
    if !no_dry_run {
        println!("*** THIS WAS A DRY RUN ***");
    }
    Ok(())
}

/// Replay a collected index: load each referenced campaign set and push its
/// status updates in parallel. A missing or unreadable index aborts before
/// any remote call; a failing individual customer does not.
pub async fn pause_unpause<G>(
    gateway: Arc<G>,
    store: &BlobStore,
    index_digest: &Digest,
    status: CampaignStatus,
    validate_only: bool,
    workers: usize,
    verbose: bool,
) -> Result<ProgressTotals>
where
    G: AdsGateway + 'static,
{
    println!("loading campaign sets {index_digest}...");
    let index: CampaignSetIndex = store
        .get(index_digest)
        .with_context(|| format!("cannot load campaign sets {index_digest}"))?;

    println!(
        "{} campaigns...",
        match status {
            CampaignStatus::Paused => "pausing",
            CampaignStatus::Enabled => "unpausing",
        }
    );
    let monitor = ProgressMonitor::start(index.campaign_sets.len() as u64);

    {
        let store = store.clone();
        let progress = monitor.handle();
        run_workers(workers, index.campaign_sets, move |digest| {
            let gateway = Arc::clone(&gateway);
            let store = store.clone();
            let progress = progress.clone();
            async move {
                let result = mutate_campaign_set(
                    &*gateway, &store, &digest, status, validate_only, verbose, &progress,
                )
                .await;
                // Completion counts even for a failed customer, so the
                // counter converges on the expected total.
                progress.customers(1);
                result
            }
        })
        .await;
    }

    let totals = monitor.finish().await;
    println!("done");
    Ok(totals)
}

async fn mutate_campaign_set<G: AdsGateway>(
    gateway: &G,
    store: &BlobStore,
    digest: &Digest,
    status: CampaignStatus,
    validate_only: bool,
    verbose: bool,
    progress: &ProgressHandle,
) -> Result<()> {
    let campaign_set: CampaignSet = store
        .get(digest)
        .with_context(|| format!("cannot load campaign set {digest}"))?;
    if campaign_set.is_empty() {
        return Ok(());
    }

    let customer_id = campaign_set.customer_id;
    for chunk in campaign_set.campaign_ids.chunks(MAX_MUTATE_BATCH) {
        if verbose {
            println!(
                "mutating {} campaign(s) for customer {customer_id}",
                chunk.len()
            );
        }
        gateway
            .set_campaign_status(customer_id, chunk, status, validate_only)
            .await
            .with_context(|| format!("status update rejected for customer {customer_id}"))?;
        progress.campaigns(chunk.len() as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::FakeGateway;
    use crate::store::StoreError;
    use tempfile::TempDir;

    fn store() -> (TempDir, BlobStore) {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().join("blobs"));
        (dir, store)
    }

    fn seed_index(store: &BlobStore, sets: &[CampaignSet]) -> Digest {
        let digests = sets.iter().map(|set| store.put(set).unwrap()).collect();
        store.put(&CampaignSetIndex::new(digests)).unwrap()
    }

    #[tokio::test]
    async fn chunks_large_campaign_sets_by_batch_limit() {
        let (_dir, store) = store();
        let index = seed_index(
            &store,
            &[CampaignSet::new(1, (0..2500).collect())],
        );
        let gateway = Arc::new(FakeGateway::default());

        pause_unpause(
            Arc::clone(&gateway),
            &store,
            &index,
            CampaignStatus::Paused,
            true,
            4,
            false,
        )
        .await
        .unwrap();

        let calls = gateway.mutate_calls();
        let sizes: Vec<usize> = calls.iter().map(|call| call.campaign_ids.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
        assert!(calls.iter().all(|call| call.status == CampaignStatus::Paused));
    }

    #[tokio::test]
    async fn dry_run_is_the_default_and_override_disables_it() {
        let (_dir, store) = store();
        let index = seed_index(&store, &[CampaignSet::new(1, vec![10, 11])]);

        let gateway = Arc::new(FakeGateway::default());
        pause_unpause(
            Arc::clone(&gateway),
            &store,
            &index,
            CampaignStatus::Paused,
            true,
            1,
            false,
        )
        .await
        .unwrap();
        assert!(gateway.mutate_calls().iter().all(|call| call.validate_only));

        let gateway = Arc::new(FakeGateway::default());
        pause_unpause(
            Arc::clone(&gateway),
            &store,
            &index,
            CampaignStatus::Enabled,
            false,
            1,
            false,
        )
        .await
        .unwrap();
        let calls = gateway.mutate_calls();
        assert!(!calls.is_empty());
        assert!(calls.iter().all(|call| !call.validate_only));
        assert!(calls.iter().all(|call| call.status == CampaignStatus::Enabled));
    }

    #[tokio::test]
    async fn empty_campaign_set_issues_no_remote_calls() {
        let (_dir, store) = store();
        let index = seed_index(
            &store,
            &[
                CampaignSet::new(1, vec![20, 21, 22, 23, 24]),
                CampaignSet::new(2, vec![]),
            ],
        );
        let gateway = Arc::new(FakeGateway::default());

        let totals = pause_unpause(
            Arc::clone(&gateway),
            &store,
            &index,
            CampaignStatus::Paused,
            true,
            2,
            false,
        )
        .await
        .unwrap();

        let calls = gateway.mutate_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].customer_id, 1);
        assert_eq!(calls[0].campaign_ids, vec![20, 21, 22, 23, 24]);
        // The empty set completes without a remote call but still counts.
        assert_eq!(totals.customers, 2);
        assert_eq!(totals.campaigns, 5);
    }

    #[tokio::test]
    async fn rejected_customer_does_not_block_the_others() {
        let (_dir, store) = store();
        let index = seed_index(
            &store,
            &[
                CampaignSet::new(1, vec![10]),
                CampaignSet::new(2, vec![20]),
            ],
        );
        let gateway = Arc::new(FakeGateway {
            fail_mutation_for: [1].into(),
            ..FakeGateway::default()
        });

        let totals = pause_unpause(
            Arc::clone(&gateway),
            &store,
            &index,
            CampaignStatus::Paused,
            true,
            2,
            false,
        )
        .await
        .unwrap();

        let calls = gateway.mutate_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].customer_id, 2);
        // The rejected customer still counts toward completion, so the
        // progress counter converges on the expected total.
        assert_eq!(totals.customers, 2);
        assert_eq!(totals.campaigns, 1);
    }

    #[tokio::test]
    async fn missing_index_aborts_before_any_mutation() {
        let (_dir, store) = store();
        let gateway = Arc::new(FakeGateway::default());
        let absent: Digest = "b".repeat(40).parse().unwrap();

        let err = pause_unpause(
            Arc::clone(&gateway),
            &store,
            &absent,
            CampaignStatus::Paused,
            true,
            2,
            false,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound(_))
        ));
        assert!(gateway.mutate_calls().is_empty());
    }
}
