mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use common::{address, hash, test_settings, SyntheticGateway, TOKEN};
use erc20_transfer_analytics::blockchain::{FetchSettings, TransferDecoder, TransferLogFetcher};
use erc20_transfer_analytics::models::{BlockRange, GapKind, RawLog};

fn gateway_with_transfers(blocks: std::ops::RangeInclusive<u64>) -> SyntheticGateway {
    let mut gateway = SyntheticGateway::new();
    for block in blocks {
        gateway.add_block(block, block * 12);
        gateway.add_transfer(block, block, 0, &address(1), &address(2), block as u128);
    }
    gateway
}

fn fetcher<'a>(gateway: &'a SyntheticGateway, settings: FetchSettings) -> TransferLogFetcher<'a, SyntheticGateway> {
    TransferLogFetcher::new(gateway, TransferDecoder::new(TOKEN).unwrap(), settings)
}

#[tokio::test]
async fn test_sub_ranges_are_contiguous_and_exhaustive() {
    let gateway = gateway_with_transfers(100..=109);
    let settings = FetchSettings {
        log_chunk_size: 3,
        ..test_settings()
    };
    let range = BlockRange::new(100, 109).unwrap();

    let output = fetcher(&gateway, settings)
        .fetch_range(range, &AtomicBool::new(false))
        .await
        .unwrap();

    let mut requested = gateway.requested_log_ranges.lock().unwrap().clone();
    requested.sort_by_key(|r| r.start);
    assert_eq!(requested.first().unwrap().start, 100);
    assert_eq!(requested.last().unwrap().end, 109);
    for pair in requested.windows(2) {
        assert_eq!(pair[0].end + 1, pair[1].start);
    }
    assert!(requested.iter().all(|r| r.len() <= 3));

    let blocks: Vec<u64> = output.transfers.iter().map(|t| t.block_number).collect();
    assert_eq!(blocks, (100..=109).collect::<Vec<_>>());
    assert!(output.gaps.is_empty());
    assert!(output.defects.is_empty());
}

#[tokio::test]
async fn test_too_many_results_bisects_range() {
    let mut gateway = gateway_with_transfers(200..=203);
    gateway.limit_logs_per_call(1);
    let settings = FetchSettings {
        log_chunk_size: 4,
        ..test_settings()
    };

    let output = fetcher(&gateway, settings)
        .fetch_range(BlockRange::new(200, 203).unwrap(), &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(output.transfers.len(), 4);
    assert!(output.gaps.is_empty());
    // 200..=203, 200..=201, 200, 201, 202..=203, 202, 203
    assert_eq!(gateway.log_calls.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_single_block_over_limit_becomes_gap() {
    let mut gateway = gateway_with_transfers(300..=301);
    gateway.add_transfer(301, 301, 1, &address(3), &address(4), 5);
    gateway.limit_logs_per_call(1);

    let output = fetcher(&gateway, test_settings())
        .fetch_range(BlockRange::new(300, 301).unwrap(), &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(output.transfers.len(), 1);
    assert_eq!(output.gaps.len(), 1);
    assert_eq!(
        output.gaps[0].kind,
        GapKind::LogRange { from_block: 301, to_block: 301 }
    );
}

#[tokio::test]
async fn test_duplicate_and_malformed_logs_are_tallied() {
    let mut gateway = gateway_with_transfers(400..=401);
    gateway.add_transfer(401, 401, 0, &address(1), &address(2), 401);
    gateway.add_raw_log(RawLog {
        address: Some(TOKEN.to_string()),
        topics: vec![erc20_transfer_analytics::blockchain::TRANSFER_EVENT_SIGNATURE.to_string()],
        data: Some("0x".to_string()),
        block_number: Some("0x190".to_string()),
        transaction_hash: Some(hash(77)),
        log_index: Some("0x5".to_string()),
        removed: false,
    });

    let output = fetcher(&gateway, test_settings())
        .fetch_range(BlockRange::new(400, 401).unwrap(), &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(output.transfers.len(), 2);
    assert_eq!(output.defects.count("duplicate_log"), 1);
    assert_eq!(output.defects.count("topic_count"), 1);
    assert_eq!(output.defects.total, 2);
}

#[tokio::test]
async fn test_cancellation_is_checked_before_each_batch() {
    let gateway = gateway_with_transfers(500..=509);
    let cancel = AtomicBool::new(true);

    let result = fetcher(&gateway, test_settings())
        .fetch_range(BlockRange::new(500, 509).unwrap(), &cancel)
        .await;

    assert!(result.is_err());
    assert_eq!(gateway.log_calls.load(Ordering::SeqCst), 0);
}
