use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the process. Returns early once something else requested shutdown,
/// e.g. the browser closing stdin.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}
