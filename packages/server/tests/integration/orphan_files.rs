use std::time::Duration;

use common::config::MaintenanceConfig;
use tokio_util::sync::CancellationToken;

use server::maintenance::{SweepErrorKind, SweepOptions};

use crate::common::{Fixture, HOUR, legacy_product, product};

const LIVE: SweepOptions = SweepOptions { dry_run: false };
const DRY: SweepOptions = SweepOptions { dry_run: true };

mod deletion {
    use super::*;

    #[tokio::test]
    async fn deletes_only_old_unreferenced_blobs() {
        let fx = Fixture::new().await;
        fx.put_blob("a.jpg", 2 * HOUR).await;
        fx.put_blob("b.jpg", 2 * HOUR).await;
        fx.put_blob("c.jpg", 2 * HOUR).await;
        fx.records.insert(product(&["/uploads/a.jpg"]));
        fx.records.insert(product(&["/uploads/b.jpg"]));

        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.retained, 2);
        assert_eq!(report.deleted_keys.iter().collect::<Vec<_>>(), vec!["c.jpg"]);
        assert!(fx.blob_exists("a.jpg"));
        assert!(fx.blob_exists("b.jpg"));
        assert!(!fx.blob_exists("c.jpg"));
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn legacy_single_image_counts_as_reference() {
        let fx = Fixture::new().await;
        fx.put_blob("old-style.png", 2 * HOUR).await;
        fx.records.insert(legacy_product("/uploads/old-style.png"));

        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.deleted_keys.is_empty());
        assert!(fx.blob_exists("old-style.png"));
    }

    #[tokio::test]
    async fn absolute_url_references_are_reduced_to_filenames() {
        let fx = Fixture::new().await;
        fx.put_blob("x.jpg", 2 * HOUR).await;
        fx.records
            .insert(product(&["https://shop.example/uploads/x.jpg?v=2"]));

        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.retained, 1);
        assert!(fx.blob_exists("x.jpg"));
    }

    #[tokio::test]
    async fn second_run_deletes_nothing() {
        let fx = Fixture::new().await;
        fx.put_blob("stale.jpg", 2 * HOUR).await;
        let svc = fx.maintenance(MaintenanceConfig::default());

        let first = svc
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();
        let second = svc
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(first.deleted_keys.len(), 1);
        assert!(second.deleted_keys.is_empty());
        assert_eq!(second.scanned, 0);
    }

    #[tokio::test]
    async fn empty_stores_produce_empty_report() {
        let fx = Fixture::new().await;
        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.scanned, 0);
        assert!(report.deleted_keys.is_empty());
        assert!(!report.cancelled);
        assert!(report.finished_at >= report.started_at);
    }
}

mod safety {
    use super::*;

    #[tokio::test]
    async fn blobs_inside_grace_period_survive() {
        let fx = Fixture::new().await;
        fx.put_blob("fresh-upload.jpg", Duration::from_secs(60)).await;

        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped_recent, 1);
        assert!(report.deleted_keys.is_empty());
        assert!(fx.blob_exists("fresh-upload.jpg"));
    }

    #[tokio::test]
    async fn invalid_reference_is_reported_and_siblings_protected() {
        let fx = Fixture::new().await;
        fx.put_blob("keep.jpg", 2 * HOUR).await;
        let id = fx.records.insert(product(&["/uploads/", "/uploads/keep.jpg"]));

        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert!(fx.blob_exists("keep.jpg"));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, SweepErrorKind::InvalidReference);
        assert_eq!(report.errors[0].target, id.to_string());
    }

    #[tokio::test]
    async fn dry_run_lists_candidates_without_deleting() {
        let fx = Fixture::new().await;
        fx.put_blob("orphan.jpg", 2 * HOUR).await;

        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(DRY, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(report.deleted_keys.is_empty());
        assert!(report.would_delete.contains("orphan.jpg"));
        assert!(fx.blob_exists("orphan.jpg"));
    }

    #[tokio::test]
    async fn cancelled_sweep_deletes_nothing_further() {
        let fx = Fixture::new().await;
        fx.put_blob("one.jpg", 2 * HOUR).await;
        fx.put_blob("two.jpg", 2 * HOUR).await;

        let token = CancellationToken::new();
        token.cancel();
        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.deleted_keys.is_empty());
        assert!(fx.blob_exists("one.jpg"));
        assert!(fx.blob_exists("two.jpg"));
    }

    #[tokio::test]
    async fn cancellation_between_deletes_returns_partial_report() {
        let fx = Fixture::new().await;
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            fx.put_blob(name, 2 * HOUR).await;
        }

        let token = CancellationToken::new();
        let report = fx
            .maintenance_cancelling_after_delete(MaintenanceConfig::default(), token.clone())
            .sweep_orphan_files(LIVE, &token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.deleted_keys.into_iter().collect::<Vec<_>>(), vec!["a.jpg"]);
        assert!(!fx.blob_exists("a.jpg"));
        assert!(fx.blob_exists("b.jpg"));
        assert!(fx.blob_exists("c.jpg"));
    }

    #[tokio::test]
    async fn cancellation_after_snapshot_counts_nothing_scanned() {
        let fx = Fixture::new().await;
        fx.put_blob("a.jpg", 2 * HOUR).await;
        fx.put_blob("b.jpg", 2 * HOUR).await;

        let token = CancellationToken::new();
        let cancel = token.clone();
        fx.records.on_next_find_all(move |_| cancel.cancel());
        let report = fx
            .maintenance(MaintenanceConfig::default())
            .sweep_orphan_files(LIVE, &token)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.scanned, 0);
        assert!(report.deleted_keys.is_empty());
        assert!(fx.blob_exists("a.jpg"));
    }

    #[tokio::test]
    async fn zero_grace_period_sweeps_everything_unreferenced() {
        let fx = Fixture::new().await;
        fx.put_blob("just-now.jpg", Duration::from_secs(5)).await;

        let config = MaintenanceConfig {
            grace_period_secs: 0,
            ..Default::default()
        };
        let report = fx
            .maintenance(config)
            .sweep_orphan_files(LIVE, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.deleted_keys.contains("just-now.jpg"));
    }
}
