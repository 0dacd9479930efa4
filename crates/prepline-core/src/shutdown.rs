//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use signal_hook::consts::{SIGINT, SIGTERM};

static FLAG: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Global shutdown flag, set by the SIGTERM/SIGINT handlers
pub fn shutdown_flag() -> &'static Arc<AtomicBool> {
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Route SIGINT/SIGTERM to the shutdown flag.
///
/// The first signal only sets the flag so the current page or batch can
/// finish. A second one while the flag is set exits with status 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    let flag = shutdown_flag();
    for sig in [SIGINT, SIGTERM] {
        // Registration order matters: the conditional exit sees the flag
        // before this signal sets it.
        signal_hook::flag::register_conditional_shutdown(sig, 130, Arc::clone(flag))?;
        signal_hook::flag::register(sig, Arc::clone(flag))?;
    }
    Ok(())
}
