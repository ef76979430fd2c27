#![cfg(not(loom))]
//! End-to-end tests for `LinkService` against a loopback controller.

use std::sync::Arc;

use linkframe::{
    config::LinkConfig,
    error::LinkError,
    exchange::ExchangeKind,
    link::{Disposition, LinkService},
    message::{
        AbortScope,
        CatalogError,
        ElsSend,
        FrameHeader,
        IocStatus,
        LinkServiceResponse,
        ReplyPayload,
        Request,
        SgeDescriptor,
    },
    pool::{BufferIndex, BufferState, ReplenishDecision},
    token::{ExchangeToken, PortId},
};
use linkframe_testing::{
    LoopbackTransport,
    abort_reply,
    buffer_consumed,
    buffer_returned,
    els_reply,
};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PORT: PortId = PortId::new(0);

type Service = LinkService<LoopbackTransport>;

fn config(auto_replenish: bool) -> LinkConfig {
    LinkConfig::builder()
        .ports([PortId::new(0), PortId::new(1)])
        .pool_capacity(4)
        .buffer_size(0x1000)
        .auto_replenish(auto_replenish)
        .build()
        .expect("valid configuration")
}

#[fixture]
fn service() -> Service { LinkService::new(config(true), LoopbackTransport::new()) }

fn els(destination: u32) -> ElsSend {
    ElsSend {
        port: PORT,
        alias_index: 0,
        destination,
        els_command: 0x0300_0000,
        payload: SgeDescriptor::outbound(0x9000, 0x74),
        response: Some(SgeDescriptor::inbound(0xA000, 0x74)),
    }
}

fn plogi_frame() -> FrameHeader {
    let mut frame = FrameHeader::default();
    frame.routing.r_ctl = 0x22;
    frame.routing.d_id = 0x0001_0200;
    frame.source.s_id = 0x00AB_CDEF;
    frame.ox_id = 0x1234;
    frame.rx_id = 0xFFFF;
    frame
}

async fn fill(service: &Service) -> Vec<(BufferIndex, ExchangeToken)> {
    let mut posted = Vec::new();
    for i in 0..4u64 {
        let (index, submission) = service
            .post_buffer_at(PORT, 0x10_0000 + i * 0x1000)
            .await
            .expect("post accepted");
        posted.push((index, submission.token));
    }
    posted
}

#[rstest]
#[tokio::test]
async fn posted_buffer_carries_its_index_as_transaction_context(service: Service) {
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");

    let (token, request) = service.transport().last_request();
    assert_eq!(token, submission.token);
    let Request::BufferPost(post) = request else {
        panic!("expected a buffer post, got {request:?}");
    };
    assert_eq!(post.buffers()[0].transaction_context, index.get());
    assert_eq!(
        post.buffers()[0].descriptor,
        SgeDescriptor::inbound(0x10_0000, 0x1000)
    );
    assert_eq!(service.outstanding(), 1);
}

#[rstest]
#[tokio::test]
async fn consumed_buffer_three_is_reposted_before_pool_is_healthy(service: Service) {
    let posted = fill(&service).await;
    let (index, token) = posted[3];
    assert_eq!(index, BufferIndex::new(3));
    let pool = service.pool(PORT).expect("port 0 pool");
    service.transport().clear();

    let disposition = service
        .handle_reply(&buffer_consumed(token, PORT, index, false, plogi_frame()))
        .await
        .expect("reply applied");

    let Disposition::Consumed {
        decision,
        reposted: Some(reposted),
        ..
    } = disposition
    else {
        panic!("unexpected disposition {disposition:?}");
    };
    assert_eq!(decision, ReplenishDecision::Replenish(index));
    let (sent_token, request) = service.transport().last_request();
    assert_eq!(sent_token, reposted);
    assert!(matches!(
        request,
        Request::BufferPost(ref post) if post.buffers()[0].transaction_context == 3
    ));
    assert_eq!(pool.occupancy(), 4);
    assert!(pool.is_healthy());
    assert_eq!(pool.token(index), Some(reposted));
}

#[rstest]
#[tokio::test]
async fn post_waiter_receives_the_unsolicited_frame(service: Service) {
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");

    service
        .handle_reply(&buffer_consumed(
            submission.token,
            PORT,
            index,
            false,
            plogi_frame(),
        ))
        .await
        .expect("reply applied");

    let outcome = submission
        .completion
        .await
        .expect("notifier kept")
        .expect("success");
    let ReplyPayload::Unsolicited(frame) = *outcome.payload() else {
        panic!("expected an unsolicited frame");
    };
    assert_eq!(frame.frame, plogi_frame());
    assert_eq!(frame.transaction_context, index.get());
}

#[rstest]
#[tokio::test]
async fn no_response_needed_restores_buffer_without_new_request(service: Service) {
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");
    let pool = service.pool(PORT).expect("port 0 pool");
    let frames_before = service.transport().len();

    for _ in 0..2 {
        let disposition = service
            .handle_reply(&buffer_consumed(
                submission.token,
                PORT,
                index,
                true,
                plogi_frame(),
            ))
            .await
            .expect("reply applied");
        assert!(matches!(
            disposition,
            Disposition::Consumed {
                decision: ReplenishDecision::None,
                reposted: None,
                ..
            }
        ));
    }

    assert_eq!(service.transport().len(), frames_before);
    assert_eq!(pool.state(index), Some(BufferState::Posted));
    assert_eq!(pool.occupancy(), 1);
}

#[tokio::test]
async fn manual_replenish_when_automatic_is_off() {
    let service = LinkService::new(config(false), LoopbackTransport::new());
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");
    let pool = service.pool(PORT).expect("port 0 pool");

    service
        .handle_reply(&buffer_consumed(
            submission.token,
            PORT,
            index,
            false,
            plogi_frame(),
        ))
        .await
        .expect("reply applied");
    assert_eq!(pool.state(index), Some(BufferState::ConsumedAwaitingReplenish));
    assert!(!pool.is_healthy());

    let reposted = service.replenish(PORT, index).await.expect("reposted");
    assert_eq!(pool.token(index), Some(reposted.token));
    assert!(pool.is_healthy());
}

#[rstest]
#[tokio::test]
async fn unsolicited_frames_reach_the_sink() {
    let (tx, mut rx) = mpsc::channel(4);
    let service = LinkService::new(config(true), LoopbackTransport::new()).with_frame_sink(tx);
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");

    service
        .handle_reply(&buffer_consumed(
            submission.token,
            PORT,
            index,
            true,
            plogi_frame(),
        ))
        .await
        .expect("reply applied");

    let received = rx.recv().await.expect("frame forwarded");
    assert_eq!(received.port, PORT);
    assert_eq!(received.index, index);
    assert!(received.no_response_needed);
    assert_eq!(received.frame.frame.ox_id, 0x1234);
}

#[rstest]
#[tokio::test]
async fn els_send_packs_destination_and_resolves(service: Service) {
    let submission = service.send_els(els(0x00AB_CDEF)).await.expect("sent");

    let (_, request) = service.transport().last_request();
    assert!(matches!(request, Request::ElsSend(ref send) if send.destination == 0x00AB_CDEF));

    let disposition = service
        .handle_reply(&els_reply(submission.token, IocStatus::SUCCESS, 0x74))
        .await
        .expect("reply applied");
    assert_eq!(
        disposition,
        Disposition::Resolved {
            token: submission.token,
            kind: ExchangeKind::ElsSend
        }
    );
    let outcome = submission
        .completion
        .await
        .expect("notifier kept")
        .expect("success");
    assert_eq!(outcome.payload(), &ReplyPayload::ResponseLength(0x74));
    assert_eq!(service.outstanding(), 0);
}

#[rstest]
#[tokio::test]
async fn controller_status_is_surfaced_and_service_stays_usable(service: Service) {
    let failed = service.send_els(els(0x0001_0200)).await.expect("sent");

    service
        .handle_reply(&els_reply(failed.token, IocStatus::FC_DID_INVALID, 0))
        .await
        .expect("reply applied");

    let error = failed
        .completion
        .await
        .expect("notifier kept")
        .expect_err("controller refused");
    assert!(error.is_controller_status());

    let next = service.send_els(els(0x0001_0300)).await.expect("sent");
    assert!(service.tracker().contains(next.token));
}

#[rstest]
#[tokio::test]
async fn aborted_exchange_reply_is_stale_while_sibling_resolves(service: Service) {
    let t1 = service.send_els(els(0x0001_0200)).await.expect("sent");
    let t2 = service.send_els(els(0x0001_0300)).await.expect("sent");

    let abort = service
        .abort_exact(t1.token)
        .await
        .expect("abort sent")
        .expect("t1 open");
    let (_, request) = service.transport().last_request();
    assert!(matches!(
        request,
        Request::Abort(message) if message.scope == AbortScope::Exact(t1.token.get())
    ));

    let disposition = service
        .handle_reply(&abort_reply(abort.token, IocStatus::SUCCESS))
        .await
        .expect("abort reply applied");
    assert_eq!(
        disposition,
        Disposition::Aborted {
            token: abort.token,
            cancelled: vec![t1.token]
        }
    );
    assert!(matches!(
        t1.completion.await.expect("notifier kept"),
        Err(LinkError::Cancelled { token }) if token == t1.token
    ));

    let late = service
        .handle_reply(&els_reply(t1.token, IocStatus::SUCCESS, 0))
        .await
        .expect("late reply applied");
    assert_eq!(late, Disposition::Stale { token: t1.token });

    let sibling = service
        .handle_reply(&els_reply(t2.token, IocStatus::SUCCESS, 0))
        .await
        .expect("reply applied");
    assert!(matches!(sibling, Disposition::Resolved { token, .. } if token == t2.token));
}

#[rstest]
#[tokio::test]
async fn aborting_a_finished_exchange_sends_nothing(service: Service) {
    let sent = service.send_els(els(0x0001_0200)).await.expect("sent");
    service
        .handle_reply(&els_reply(sent.token, IocStatus::SUCCESS, 0))
        .await
        .expect("reply applied");
    let frames = service.transport().len();

    assert!(service.abort_exact(sent.token).await.expect("no error").is_none());
    assert_eq!(service.transport().len(), frames);
}

#[rstest]
#[tokio::test]
async fn class_abort_cancels_every_els_send_on_port(service: Service) {
    let a = service.send_els(els(0x0001_0200)).await.expect("sent");
    let b = service.send_els(els(0x0001_0300)).await.expect("sent");

    let abort = service
        .abort_class(PORT, AbortScope::ElsSends)
        .await
        .expect("abort sent");
    let disposition = service
        .handle_reply(&abort_reply(abort.token, IocStatus::SUCCESS))
        .await
        .expect("abort reply applied");

    assert_eq!(
        disposition,
        Disposition::Aborted {
            token: abort.token,
            cancelled: vec![a.token, b.token]
        }
    );
    assert_eq!(service.outstanding(), 0);
}

#[rstest]
#[tokio::test]
async fn confirmed_abort_reclaims_buffer_and_late_return_is_stale(service: Service) {
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");
    let pool = service.pool(PORT).expect("port 0 pool");

    let abort = service
        .abort_exact(submission.token)
        .await
        .expect("abort sent")
        .expect("post open");
    service
        .handle_reply(&abort_reply(abort.token, IocStatus::SUCCESS))
        .await
        .expect("abort reply applied");
    assert_eq!(pool.state(index), Some(BufferState::Reclaimed));
    assert_eq!(pool.token(index), None);
    assert_eq!(pool.occupancy(), 0);

    let disposition = service
        .handle_reply(&buffer_returned(
            submission.token,
            PORT,
            index,
            IocStatus::FC_ABORTED,
        ))
        .await
        .expect("reply applied");

    assert_eq!(
        disposition,
        Disposition::Stale {
            token: submission.token
        }
    );
    assert_eq!(pool.state(index), Some(BufferState::Reclaimed));
    assert!(matches!(
        submission.completion.await.expect("notifier kept"),
        Err(LinkError::Cancelled { token }) if token == submission.token
    ));
}

#[tokio::test]
async fn slot_freed_by_abort_can_be_posted_again_without_controller_return() {
    let config = LinkConfig::builder()
        .ports([PORT])
        .pool_capacity(1)
        .build()
        .expect("valid configuration");
    let service = LinkService::new(config, LoopbackTransport::new());
    let (index, first) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");
    let abort = service
        .abort_exact(first.token)
        .await
        .expect("abort sent")
        .expect("post open");

    service
        .handle_reply(&abort_reply(abort.token, IocStatus::SUCCESS))
        .await
        .expect("abort reply applied");
    let (again, second) = service
        .post_buffer_at(PORT, 0x20_0000)
        .await
        .expect("reclaimed slot is free");

    assert_eq!(again, index);
    let pool = service.pool(PORT).expect("port 0 pool");
    assert_eq!(pool.token(index), Some(second.token));
    assert_eq!(pool.occupancy(), 1);

    let late = service
        .handle_reply(&buffer_returned(first.token, PORT, index, IocStatus::FC_ABORTED))
        .await
        .expect("reply applied");
    assert_eq!(late, Disposition::Stale { token: first.token });
    assert_eq!(pool.state(index), Some(BufferState::Posted));
    assert_eq!(pool.token(index), Some(second.token));
}

#[rstest]
#[tokio::test]
async fn buffer_returned_before_abort_reply_is_reclaimed_once(service: Service) {
    let (index, submission) = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect("post accepted");
    let pool = service.pool(PORT).expect("port 0 pool");
    let abort = service
        .abort_exact(submission.token)
        .await
        .expect("abort sent")
        .expect("post open");

    service
        .handle_reply(&buffer_returned(
            submission.token,
            PORT,
            index,
            IocStatus::FC_ABORTED,
        ))
        .await
        .expect("reply applied");
    let disposition = service
        .handle_reply(&abort_reply(abort.token, IocStatus::SUCCESS))
        .await
        .expect("abort reply applied");

    assert_eq!(
        disposition,
        Disposition::Aborted {
            token: abort.token,
            cancelled: vec![]
        }
    );
    assert_eq!(pool.state(index), Some(BufferState::Reclaimed));
    assert!(matches!(
        submission.completion.await.expect("notifier kept"),
        Err(LinkError::ControllerStatus { status, .. }) if status == IocStatus::FC_ABORTED
    ));
}

#[rstest]
#[tokio::test]
async fn failed_post_releases_slot_and_token(service: Service) {
    service.transport().fail_next(1);

    let error = service
        .post_buffer_at(PORT, 0x10_0000)
        .await
        .expect_err("transport refused");

    assert!(matches!(error, LinkError::Transport(_)));
    let pool = service.pool(PORT).expect("port 0 pool");
    assert_eq!(pool.occupancy(), 0);
    assert_eq!(pool.state(BufferIndex::new(0)), Some(BufferState::Available));
    assert_eq!(service.outstanding(), 0);
    assert!(service.transport().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_send_closes_its_exchange(service: Service) {
    service.transport().fail_next(1);

    assert!(matches!(
        service.send_els(els(0x0001_0200)).await,
        Err(LinkError::Transport(_))
    ));
    assert_eq!(service.outstanding(), 0);
}

#[rstest]
#[tokio::test]
async fn posting_to_a_full_pool_fails_immediately(service: Service) {
    fill(&service).await;

    assert!(matches!(
        service.post_buffer_at(PORT, 0x20_0000).await,
        Err(LinkError::Pool(_))
    ));
    assert_eq!(service.outstanding(), 4);
}

#[rstest]
#[tokio::test]
async fn unrecognized_reply_is_rejected(service: Service) {
    let mut frame = els_reply(ExchangeToken::new(9), IocStatus::SUCCESS, 0).to_vec();
    frame[3] = 0x7F;

    assert!(matches!(
        service.handle_reply(&frame).await,
        Err(LinkError::Catalog(CatalogError::UnrecognizedMessage {
            function: 0x7F
        }))
    ));
}

#[rstest]
#[tokio::test]
async fn response_exchange_records_frame_identifiers(service: Service) {
    let received = plogi_frame();
    let response = LinkServiceResponse {
        port: PORT,
        immediate: true,
        response_length: 0x74,
        frame: FrameHeader::reply_to(&received, 0x23, 0x0099_0000),
        payload: SgeDescriptor::outbound(0xB000, 0x74),
    };

    let submission = service.send_response(response).await.expect("sent");

    let exchange = service
        .tracker()
        .get(submission.token)
        .expect("exchange open");
    assert_eq!(exchange.kind, ExchangeKind::LinkServiceResponse);
    assert_eq!(exchange.destination, Some(0x00AB_CDEF));
    assert_eq!(
        service.tracker().find_by_exchange_ids(0x1234, 0xFFFF),
        vec![submission.token]
    );
}

#[rstest]
#[tokio::test]
async fn sends_to_unserved_port_are_refused(service: Service) {
    let mut send = els(0x0001_0200);
    send.port = PortId::new(1);
    assert!(service.send_els(send).await.is_ok());

    assert!(matches!(
        service.abort_class(PortId::new(2), AbortScope::CtSends).await,
        Err(LinkError::Pool(_))
    ));
}

#[tokio::test]
async fn completion_loop_resolves_waiters_until_cancelled() {
    let service = Arc::new(LinkService::new(config(true), LoopbackTransport::new()));
    let (sender, queue) = service.completion_channel();
    let shutdown = CancellationToken::new();
    let runner = {
        let service = Arc::clone(&service);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { service.run_completions(queue, shutdown).await })
    };

    let submission = service.send_els(els(0x0001_0200)).await.expect("sent");
    sender
        .deliver(els_reply(submission.token, IocStatus::SUCCESS, 8))
        .await
        .expect("queue open");
    let outcome = submission
        .completion
        .await
        .expect("notifier kept")
        .expect("success");
    assert_eq!(outcome.payload(), &ReplyPayload::ResponseLength(8));

    shutdown.cancel();
    runner.await.expect("completion loop exits");
}

#[tokio::test]
async fn completion_loop_ends_when_senders_drop() {
    let service = LinkService::new(config(true), LoopbackTransport::new());
    let (sender, queue) = service.completion_channel();
    sender
        .deliver(bytes::Bytes::from_static(&[0u8; 3]))
        .await
        .expect("queue open");
    drop(sender);

    service
        .run_completions(queue, CancellationToken::new())
        .await;
}

#[rstest]
#[tokio::test]
async fn teardown_reclaims_posted_buffers(service: Service) {
    fill(&service).await;

    assert_eq!(service.teardown(), 4);
    assert_eq!(service.pool(PORT).expect("port 0 pool").occupancy(), 0);
}
