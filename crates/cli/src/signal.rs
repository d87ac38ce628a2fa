//! SIGINT wiring.
//!
//! The handler only flips the shared cancellation flag; engines notice at
//! their next suspension point, delete partial output and unwind with a
//! clean error. A second interrupt falls back to the default disposition
//! and terminates immediately.

use std::sync::OnceLock;

use engine::CancelToken;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Routes SIGINT to `token`.
#[cfg(unix)]
pub fn install(token: &CancelToken) {
    let _ = TOKEN.set(token.clone());

    #[allow(unsafe_code)]
    unsafe {
        libc::signal(libc::SIGINT, handle_interrupt as *const () as libc::sighandler_t);
    }
}

/// No interrupt wiring off Unix; the process default applies.
#[cfg(not(unix))]
pub fn install(token: &CancelToken) {
    let _ = TOKEN.set(token.clone());
}

#[cfg(unix)]
extern "C" fn handle_interrupt(_signum: libc::c_int) {
    // Only async-signal-safe work here: an atomic store and a handler
    // reset so the next ^C kills the process outright.
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }

    #[allow(unsafe_code)]
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_DFL);
    }
}
