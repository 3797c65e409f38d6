use std::time::Duration;

use alloy::primitives::{Address, Bytes, address};
use ledger_bind::{
    Error, Position, Settlement, bind,
    testing::{self, MockLedger, TextCodec, Value},
};

const VAULT: Address = address!("0x00000000000000000000000000000000000000aa");
const OWNER: Address = address!("0x00000000000000000000000000000000000000bb");

fn vault(ledger: &MockLedger) -> ledger_bind::Binding<MockLedger, TextCodec> {
    bind(VAULT, testing::vault_descriptor(), ledger.clone(), TextCodec).unwrap()
}

#[tokio::test]
async fn binding_and_view_derivation_is_purely_local() {
    let ledger = MockLedger::new();
    let binding = vault(&ledger);
    let _caller = binding.caller();
    let _transactor = binding.transactor();
    let _events = binding.events();
    let _tracker = binding.tracker();
    assert_eq!(ledger.request_count(), 0);
}

#[tokio::test]
async fn binding_rejects_the_zero_address() {
    let ledger = MockLedger::new();
    let result = bind(
        Address::ZERO,
        testing::vault_descriptor(),
        ledger,
        TextCodec,
    );
    assert!(matches!(result, Err(Error::Binding(_))));
}

#[tokio::test]
async fn query_round_trip() {
    let ledger = MockLedger::new();
    let descriptor = testing::vault_descriptor();
    ledger.stage_call(
        VAULT,
        testing::encode_call(&descriptor, "lockedOf", &[Value::Addr(OWNER)]),
        testing::encode_result(&descriptor, "lockedOf", &[Value::Uint(250)]),
    );

    let caller = vault(&ledger).caller();
    let result = caller.call("lockedOf", &[Value::Addr(OWNER)]).await.unwrap();
    assert_eq!(result, vec![Value::Uint(250)]);
}

#[tokio::test]
async fn query_with_no_arguments() {
    let ledger = MockLedger::new();
    let descriptor = testing::vault_descriptor();
    ledger.stage_call(
        VAULT,
        testing::encode_call(&descriptor, "totalLocked", &[]),
        testing::encode_result(&descriptor, "totalLocked", &[Value::Uint(1_000)]),
    );

    let caller = vault(&ledger).caller();
    assert_eq!(
        caller.call("totalLocked", &[]).await.unwrap(),
        vec![Value::Uint(1_000)]
    );
}

#[tokio::test]
async fn call_at_reads_at_the_requested_position() {
    let ledger = MockLedger::new();
    let descriptor = testing::vault_descriptor();
    let payload = testing::encode_call(&descriptor, "lockedOf", &[Value::Addr(OWNER)]);
    ledger.stage_call(
        VAULT,
        payload.clone(),
        testing::encode_result(&descriptor, "lockedOf", &[Value::Uint(300)]),
    );
    ledger.stage_call_at(
        VAULT,
        payload,
        Position::Block(12),
        testing::encode_result(&descriptor, "lockedOf", &[Value::Uint(120)]),
    );

    let caller = vault(&ledger).caller();
    let historical = caller
        .call_at("lockedOf", &[Value::Addr(OWNER)], Position::Block(12))
        .await
        .unwrap();
    assert_eq!(historical, vec![Value::Uint(120)]);
    assert_eq!(
        caller.call("lockedOf", &[Value::Addr(OWNER)]).await.unwrap(),
        vec![Value::Uint(300)]
    );

    // An unstaged position misses rather than falling back to the tip.
    let err = caller
        .call_at("lockedOf", &[Value::Addr(OWNER)], Position::Block(13))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn call_failures_are_distinguishable() {
    let ledger = MockLedger::new();
    let descriptor = testing::vault_descriptor();
    let caller = vault(&ledger).caller();

    // Mutate entry invoked as a query.
    let err = caller.call("lock", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Encoding(_)));

    // Argument shape mismatch, caught before any transport traffic.
    let before = ledger.request_count();
    let err = caller
        .call("lockedOf", &[Value::Uint(5)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Encoding(_)));
    assert_eq!(ledger.request_count(), before);

    // Node failure.
    let err = caller
        .call("lockedOf", &[Value::Addr(OWNER)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    // Response that does not decode against the return shapes.
    ledger.stage_call(
        VAULT,
        testing::encode_call(&descriptor, "lockedOf", &[Value::Addr(OWNER)]),
        Bytes::from_static(b"not-a-uint64"),
    );
    let err = caller
        .call("lockedOf", &[Value::Addr(OWNER)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Decoding(_)));
}

#[tokio::test]
async fn submit_returns_a_pending_operation() {
    let ledger = MockLedger::new();
    let transactor = vault(&ledger).transactor();

    let pending = transactor
        .submit("lock", &[Value::Addr(OWNER), Value::Uint(40)])
        .await
        .unwrap();
    assert_eq!(pending.entry(), "lock");
    assert_eq!(pending.address(), VAULT);
    // Accepted for broadcast, not settled.
    assert!(ledger.broadcast(pending.id()).is_some());
}

#[tokio::test]
async fn refused_operations_surface_as_rejected() {
    let ledger = MockLedger::new();
    let descriptor = testing::vault_descriptor();
    let args = [Value::Addr(OWNER), Value::Uint(40)];
    ledger.reject(
        testing::encode_call(&descriptor, "lock", &args),
        "insufficient balance",
    );

    let transactor = vault(&ledger).transactor();
    let err = transactor.submit("lock", &args).await.unwrap_err();
    assert!(matches!(err, Error::Rejected(_)));
}

#[tokio::test]
async fn wait_returns_the_settlement_on_success() {
    let ledger = MockLedger::new();
    let binding = vault(&ledger);
    let pending = binding
        .transactor()
        .submit("lock", &[Value::Addr(OWNER), Value::Uint(40)])
        .await
        .unwrap();

    ledger.settle(Settlement::succeeded(
        pending.id(),
        12,
        0,
        Bytes::from_static(b"receipt"),
    ));

    let tracker = binding.tracker().with_poll_interval(Duration::from_millis(5));
    let settlement = tracker.wait(&pending).await.unwrap();
    assert_eq!(settlement.operation, pending.id());
    assert_eq!(settlement.block, 12);
}

#[tokio::test]
async fn failed_settlement_carries_the_receipt() {
    let ledger = MockLedger::new();
    let binding = vault(&ledger);
    let pending = binding
        .transactor()
        .submit("lock", &[Value::Addr(OWNER), Value::Uint(40)])
        .await
        .unwrap();

    ledger.settle(Settlement::failed(
        pending.id(),
        12,
        3,
        Bytes::from_static(b"revert data"),
    ));

    let tracker = binding.tracker().with_poll_interval(Duration::from_millis(5));
    let err = tracker.wait(&pending).await.unwrap_err();
    let settlement = err.settlement().expect("execution failure");
    assert_eq!(settlement.receipt, Bytes::from_static(b"revert data"));
    assert_eq!(settlement.block, 12);
}

#[tokio::test]
async fn wait_timeout_does_not_affect_the_broadcast() {
    let ledger = MockLedger::new();
    let binding = vault(&ledger);
    let pending = binding
        .transactor()
        .submit("lock", &[Value::Addr(OWNER), Value::Uint(40)])
        .await
        .unwrap();

    // Never settled: the bounded wait gives up.
    let tracker = binding
        .tracker()
        .with_poll_interval(Duration::from_millis(5))
        .with_timeout(Duration::from_millis(40));
    let err = tracker.wait(&pending).await.unwrap_err();
    assert!(err.is_cancelled());

    // The operation settles later; re-waiting on the same value succeeds.
    ledger.settle(Settlement::succeeded(pending.id(), 99, 0, Bytes::new()));
    let settlement = tracker.wait(&pending).await.unwrap();
    assert_eq!(settlement.block, 99);
}

#[tokio::test]
async fn concurrent_waits_on_independent_operations() {
    let ledger = MockLedger::new();
    let binding = vault(&ledger);
    let transactor = binding.transactor();

    let first = transactor
        .submit("lock", &[Value::Addr(OWNER), Value::Uint(1)])
        .await
        .unwrap();
    let second = transactor
        .submit("unlock", &[Value::Addr(OWNER), Value::Uint(2)])
        .await
        .unwrap();

    ledger.settle(Settlement::succeeded(first.id(), 5, 0, Bytes::new()));
    ledger.settle(Settlement::failed(second.id(), 6, 0, Bytes::new()));

    let tracker = binding.tracker().with_poll_interval(Duration::from_millis(5));
    let (a, b) = tokio::join!(tracker.wait(&first), tracker.wait(&second));
    assert_eq!(a.unwrap().block, 5);
    assert!(matches!(b.unwrap_err(), Error::ExecutionFailed(_)));
}
