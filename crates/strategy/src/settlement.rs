use std::time::Duration;

/// Waits out a venue settlement window.
///
/// The contract is "do not act on redeemed funds before the redemption is
/// observably settled". The venue exposes no settlement-confirmation query,
/// so this is a bounded configured wait rather than a poll.
pub(crate) async fn await_settlement(window: Duration) {
    if !window.is_zero() {
        tokio::time::sleep(window).await;
    }
}
