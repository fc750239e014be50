//! Identity formatting and logging hooks shared across the tunnel crates.

use std::any::Any;

/// Separates the user name from the rest of a claimed client identity.
pub const IDENTITY_SEP: char = '\0';

/// Returns the part of `s` before the first `sep`, or all of `s` if
/// `sep` doesn't occur.
pub fn substring_before(s: &str, sep: char) -> &str {
    s.split_once(sep).map_or(s, |(head, _)| head)
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Logs a panic recovered at a connection boundary.
///
/// Debug builds also forward the payload to the `tunnel::diagnostics`
/// target so it can be routed to a separate sink.
pub fn report_panic(context: &str, tun: &str, payload: &(dyn Any + Send)) {
    let message = panic_message(payload);
    tracing::error!(%tun, panic = %message, "{context} panicked");
    if cfg!(debug_assertions) {
        tracing::error!(
            target: "tunnel::diagnostics",
            %tun,
            context,
            panic = %message,
            "recovered panic"
        );
    }
}
