use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Drive `fut` to completion unless `cancel` fires first, in which case the
/// future is dropped and `on_cancel` is returned.
pub async fn run_cancellable<F, T, E>(cancel: &CancellationToken, on_cancel: E, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(on_cancel),
        res = fut => res,
    }
}
