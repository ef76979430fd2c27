//! Tests for the exchange tracker.

use std::collections::HashSet;

use rstest::{fixture, rstest};

use super::*;
use crate::{
    error::LinkError,
    message::{IocStatus, ReplyPayload},
};

const PORT: PortId = PortId::new(0);

#[allow(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn tracker() -> ExchangeTracker { ExchangeTracker::new() }

fn els() -> Exchange { Exchange::new(ExchangeKind::ElsSend, PORT).with_destination(0x00AB_CDEF) }

#[rstest]
fn issued_tokens_are_distinct_and_nonzero(tracker: ExchangeTracker) {
    let tokens: HashSet<_> = (0..256)
        .map(|_| tracker.open(ExchangeKind::PrimitiveSend, PORT))
        .collect();

    assert_eq!(tokens.len(), 256);
    assert!(!tokens.contains(&ExchangeToken::new(0)));
    assert_eq!(tracker.len(), 256);
}

#[test]
fn wrapped_counter_skips_tokens_still_open() {
    let tracker = ExchangeTracker::starting_at(u32::MAX);
    let held = tracker.open(ExchangeKind::ElsSend, PORT);
    assert_eq!(held, ExchangeToken::new(u32::MAX));

    let next = tracker.open(ExchangeKind::ElsSend, PORT);
    assert_eq!(next, ExchangeToken::new(1));
}

#[tokio::test]
async fn waiter_receives_successful_outcome() {
    let tracker = ExchangeTracker::new();
    let (token, rx) = tracker.open_exchange(els());
    let outcome = ReplyOutcome::new(IocStatus::SUCCESS, 0, ReplyPayload::ResponseLength(48));

    let exchange = tracker.resolve(token, outcome).expect("token open");
    assert_eq!(exchange.destination, Some(0x00AB_CDEF));

    let result = rx.await.expect("notifier kept");
    assert_eq!(result.expect("success").payload(), &ReplyPayload::ResponseLength(48));
    assert!(tracker.is_empty());
}

#[tokio::test]
async fn controller_status_reaches_waiter_verbatim() {
    let tracker = ExchangeTracker::new();
    let (token, rx) = tracker.open_exchange(els());
    let outcome = ReplyOutcome::new(IocStatus::FC_DID_INVALID, 0x1234, ReplyPayload::None);

    tracker.resolve(token, outcome).expect("token open");

    match rx.await.expect("notifier kept") {
        Err(LinkError::ControllerStatus { status, log_info }) => {
            assert_eq!(status, IocStatus::FC_DID_INVALID);
            assert_eq!(log_info, 0x1234);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_exchange_reports_cancellation() {
    let tracker = ExchangeTracker::new();
    let (token, rx) = tracker.open_exchange(els());

    tracker.cancel(token).expect("token open");

    assert!(matches!(
        rx.await.expect("notifier kept"),
        Err(LinkError::Cancelled { token: t }) if t == token
    ));
}

#[rstest]
fn resolve_after_cancel_is_unknown(tracker: ExchangeTracker) {
    let token = tracker.open(ExchangeKind::ElsSend, PORT);
    tracker.cancel(token).expect("token open");

    assert_eq!(
        tracker.resolve(token, ReplyOutcome::success()),
        Err(UnknownToken { token })
    );
}

#[test]
#[tracing_test::traced_test]
fn late_resolve_is_logged_at_debug() {
    let tracker = ExchangeTracker::new();
    let token = tracker.open(ExchangeKind::ElsSend, PORT);
    tracker.cancel(token).expect("token open");

    let _ = tracker.resolve(token, ReplyOutcome::success());

    assert!(logs_contain("no open exchange for token"));
}

#[rstest]
fn cancel_after_resolve_is_unknown(tracker: ExchangeTracker) {
    let token = tracker.open(ExchangeKind::ElsSend, PORT);
    tracker
        .resolve(token, ReplyOutcome::success())
        .expect("token open");

    assert_eq!(tracker.cancel(token), Err(UnknownToken { token }));
}

#[rstest]
fn resolving_one_token_leaves_others_open(tracker: ExchangeTracker) {
    let t1 = tracker.open(ExchangeKind::ElsSend, PORT);
    let t2 = tracker.open(ExchangeKind::ElsSend, PORT);

    tracker
        .resolve(t1, ReplyOutcome::success())
        .expect("t1 open");

    assert!(!tracker.contains(t1));
    assert!(tracker.contains(t2));
    assert_eq!(tracker.get(t2).map(|e| e.kind), Some(ExchangeKind::ElsSend));
}

#[rstest]
#[case::reply_first(true)]
#[case::abort_first(false)]
fn exactly_one_of_reply_and_abort_closes_exchange(
    tracker: ExchangeTracker,
    #[case] reply_first: bool,
) {
    let token = tracker.open(ExchangeKind::CtSend, PORT);
    let resolve = TrackerEvent::Resolve {
        token,
        outcome: ReplyOutcome::success(),
    };
    let cancel = TrackerEvent::Cancel { token };
    let (first, second) = if reply_first {
        (resolve, cancel)
    } else {
        (cancel, resolve)
    };

    assert!(tracker.apply(first).is_ok());
    assert_eq!(tracker.apply(second), Err(UnknownToken { token }));
    assert!(tracker.is_empty());
}

#[rstest]
fn matching_filters_by_port_and_kind(tracker: ExchangeTracker) {
    let other = PortId::new(1);
    let a = tracker.open(ExchangeKind::ElsSend, PORT);
    tracker.open(ExchangeKind::CtSend, PORT);
    tracker.open(ExchangeKind::ElsSend, other);
    let b = tracker.open(ExchangeKind::ElsSend, PORT);

    assert_eq!(tracker.matching(PORT, ExchangeKind::ElsSend), vec![a, b]);
    assert!(tracker.matching(other, ExchangeKind::BufferPost).is_empty());
}

#[rstest]
fn wrapped_exchange_ids_may_match_several_tokens(tracker: ExchangeTracker) {
    let (a, _rx_a) = tracker.open_exchange(els().with_exchange_ids(0x0010, 0xFFFF));
    let (b, _rx_b) = tracker.open_exchange(els().with_exchange_ids(0x0010, 0xFFFF));
    tracker.open_exchange(els().with_exchange_ids(0x0011, 0xFFFF));

    assert_eq!(tracker.find_by_exchange_ids(0x0010, 0xFFFF), vec![a, b]);
}

#[rstest]
#[case(ExchangeKind::BufferPost, AbortScope::AllBuffers, true)]
#[case(ExchangeKind::ElsSend, AbortScope::ElsSends, true)]
#[case(ExchangeKind::CtSend, AbortScope::CtSends, true)]
#[case(ExchangeKind::ElsSend, AbortScope::CtSends, false)]
#[case(ExchangeKind::PrimitiveSend, AbortScope::AllBuffers, false)]
#[case(ExchangeKind::ElsSend, AbortScope::Exact(7), false)]
fn class_scope_membership(
    #[case] kind: ExchangeKind,
    #[case] scope: AbortScope,
    #[case] expected: bool,
) {
    assert_eq!(kind.in_scope(scope), expected);
}

#[test]
fn concurrent_opens_never_share_a_token() {
    let tracker = ExchangeTracker::new();
    let tokens: Vec<ExchangeToken> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..128)
                        .map(|_| tracker.open(ExchangeKind::ElsSend, PORT))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("opener panicked"))
            .collect()
    });

    let unique: HashSet<_> = tokens.iter().copied().collect();
    assert_eq!(unique.len(), 1024);
    assert_eq!(tracker.len(), 1024);
}
