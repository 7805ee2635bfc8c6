use anyhow::Result;

/// Every handler of the host runs on this one thread, so handlers never run concurrently with
/// each other and only interleave at `.await` points.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
