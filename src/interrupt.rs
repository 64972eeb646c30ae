use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Install a Ctrl-C handler that raises the returned flag.
///
/// The batch loops poll the flag between items, so an interrupt never leaves
/// a half-written image behind.
pub fn install_handler() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();

    ctrlc::set_handler(move || {
        s.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    Ok(stop)
}

pub(crate) fn requested(stop: &AtomicBool) -> bool {
    stop.load(Ordering::SeqCst)
}
