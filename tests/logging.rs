#![cfg(not(loom))]
//! Log output of the link service, captured through the `log` facade.

use linkframe::{
    config::LinkConfig,
    link::LinkService,
    message::IocStatus,
    token::ExchangeToken,
};
use linkframe_testing::{LoggerHandle, LoopbackTransport, els_reply, logger};
use log::Level;
use rstest::rstest;

#[rstest]
#[tokio::test]
async fn stale_reply_is_logged_as_warning(mut logger: LoggerHandle) {
    let service = LinkService::new(LinkConfig::default(), LoopbackTransport::new());

    service
        .handle_reply(&els_reply(ExchangeToken::new(77), IocStatus::SUCCESS, 0))
        .await
        .expect("stale replies are not errors");

    assert!(
        logger.contains(Level::Warn, "no longer open"),
        "stale reply warning not found"
    );
}

#[rstest]
#[tokio::test]
async fn undecodable_frame_is_logged_as_warning(mut logger: LoggerHandle) {
    let service = LinkService::new(LinkConfig::default(), LoopbackTransport::new());

    assert!(service.handle_reply(&[0x00, 0x00, 0x00, 0x42]).await.is_err());

    assert!(
        logger.contains(Level::Warn, "unrecognized reply frame"),
        "decode warning not found"
    );
}
