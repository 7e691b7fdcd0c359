//! SIGINT / SIGTERM handling for restore.
//!
//! The handler only records the signal. Orchestrators poll the flag with
//! [`check_interrupted`] between phases and while copying trees, and unwind
//! with [`Error::Interrupted`], so scoped resources such as the session
//! directory are dropped before the process exits. A second signal while
//! the flag is already set terminates the process right away.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static INTERRUPTED: OnceLock<Arc<AtomicBool>> = OnceLock::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);

fn shared_flag() -> &'static Arc<AtomicBool> {
    INTERRUPTED.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

/// Routes SIGINT, SIGTERM and SIGQUIT into [`interrupt_flag`]. Installing
/// twice is a no-op.
pub fn install_interrupt_handler() -> Result<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    let res = TERM_SIGNALS.iter().try_for_each(|sig| {
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(shared_flag()))?;
        flag::register(*sig, Arc::clone(shared_flag()))?;
        Ok::<_, std::io::Error>(())
    });
    if let Err(e) = res {
        INSTALLED.store(false, Ordering::SeqCst);
        return Err(e.into());
    }
    tracing::debug!("Installed interrupt handler");
    Ok(())
}

/// The process wide flag set by the handler.
pub fn interrupt_flag() -> &'static AtomicBool {
    shared_flag()
}

pub fn check_interrupted(flag: &AtomicBool) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}
