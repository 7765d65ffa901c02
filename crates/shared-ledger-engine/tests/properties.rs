//! Ledger behaviour against a real RocksDB entry store.

use std::sync::Arc;

use shared_ledger_core::{LedgerError, Nonce, OperationCatalog, OwnerId};
use shared_ledger_engine::{BalanceCache, Ledger, LedgerEngine, DEFAULT_CACHE_TTL};
use shared_ledger_store::{MemoryKv, RocksStore};
use tempfile::TempDir;

fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).unwrap()
}

fn nonce(id: &str) -> Nonce {
    Nonce::new(id).unwrap()
}

fn engine_with(catalog: OperationCatalog) -> (Arc<LedgerEngine>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    (Arc::new(LedgerEngine::new(Arc::new(store), catalog)), dir)
}

#[tokio::test]
async fn worked_example() {
    let (engine, _dir) = engine_with(OperationCatalog::standard());

    engine
        .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
        .await
        .unwrap();
    assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 10);

    engine
        .create_entry("CREDIT_SPEND", &owner("u1"), &nonce("n2"))
        .await
        .unwrap();
    assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 9);

    let err = engine
        .create_entry("CREDIT_SPEND", &owner("u1"), &nonce("n2"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::DuplicateTransaction {
            nonce: "n2".into()
        }
    );
    assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 9);

    let err = engine
        .create_entry("CREDIT_SPEND", &owner("u2"), &nonce("n3"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientBalance {
            owner_id: "u2".into(),
            balance: 0,
            amount: -1,
        }
    );
}

#[tokio::test]
async fn replayed_nonce_persists_once() {
    let (engine, _dir) = engine_with(OperationCatalog::standard());

    let first = engine
        .create_entry("DAILY_REWARD", &owner("u1"), &nonce("reward-day-1"))
        .await
        .unwrap();
    assert_eq!(first.amount, 1);

    for _ in 0..4 {
        let err = engine
            .create_entry("DAILY_REWARD", &owner("u1"), &nonce("reward-day-1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::DuplicateTransaction {
                nonce: "reward-day-1".into()
            }
        );
    }

    let entries = engine.list_entries(&owner("u1"), 100, 0).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 1);
}

#[tokio::test]
async fn balance_is_sum_of_committed_amounts() {
    let catalog =
        OperationCatalog::extended([("CONTENT_CREATION", -5), ("CONTENT_ACCESS", 0)]).unwrap();
    let (engine, _dir) = engine_with(catalog);

    let ops = [
        "SIGNUP_CREDIT",
        "CREDIT_ADD",
        "CONTENT_CREATION",
        "DAILY_REWARD",
        "CONTENT_ACCESS",
        "CREDIT_SPEND",
        "CONTENT_CREATION",
        "CONTENT_CREATION",
    ];

    let mut expected = 0;
    for (i, op) in ops.iter().enumerate() {
        match engine
            .create_entry(op, &owner("u1"), &nonce(&format!("n{i}")))
            .await
        {
            Ok(entry) => expected += entry.amount,
            Err(LedgerError::InsufficientBalance { balance, amount, .. }) => {
                assert!(balance + amount < 0);
            }
            Err(other) => panic!("unexpected error: {other}"),
        }

        let balance = engine.get_balance(&owner("u1")).await.unwrap();
        assert_eq!(balance, expected);
        assert!(balance >= 0);
    }

    // 3 + 10 - 5 + 1 + 0 - 1 - 5 leaves 3, so the last creation is rejected.
    assert_eq!(expected, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_spends_respect_balance() {
    let catalog = OperationCatalog::extended([("CONTENT_CREATION", -5)]).unwrap();
    let (engine, _dir) = engine_with(catalog);

    // 23 = SIGNUP_CREDIT + 2 * CREDIT_ADD
    for (op, n) in [("SIGNUP_CREDIT", "f1"), ("CREDIT_ADD", "f2"), ("CREDIT_ADD", "f3")] {
        engine.create_entry(op, &owner("u1"), &nonce(n)).await.unwrap();
    }

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .create_entry("CONTENT_CREATION", &owner("u1"), &nonce(&format!("spend-{i}")))
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for result in futures::future::join_all(tasks).await {
        match result.unwrap() {
            Ok(_) => committed += 1,
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(committed, 23 / 5);
    assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_replays_commit_once() {
    let (engine, _dir) = engine_with(OperationCatalog::standard());

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .create_entry("CREDIT_ADD", &owner("u1"), &nonce("once"))
                    .await
            })
        })
        .collect();

    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LedgerError::DuplicateTransaction { .. })));
    assert_eq!(engine.get_balance(&owner("u1")).await.unwrap(), 10);
}

#[tokio::test]
async fn cached_read_reflects_write() {
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    let engine = LedgerEngine::new(Arc::new(store), OperationCatalog::standard());
    let cache = BalanceCache::new(Arc::new(MemoryKv::new()), DEFAULT_CACHE_TTL);
    let ledger = Ledger::new(engine, cache);

    ledger
        .create_entry("CREDIT_ADD", &owner("u1"), &nonce("n1"))
        .await
        .unwrap();
    assert_eq!(ledger.get_balance(&owner("u1")).await.unwrap(), 10);

    ledger
        .create_entry("CREDIT_SPEND", &owner("u1"), &nonce("n2"))
        .await
        .unwrap();
    assert_eq!(ledger.get_balance(&owner("u1")).await.unwrap(), 9);
}
