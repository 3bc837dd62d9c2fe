/// Runs `f` as one uninterrupted capture window.
///
/// With the `critical-window` feature the closure executes inside
/// `critical_section::with`, masking interrupts (or taking the platform's
/// global lock) for its whole duration. Any suspension longer than one bit cell
/// corrupts the capture, so nothing that can yield may run inside `f`.
///
/// # Example
/// ```rust
/// let n = smartport_probe::timer::capture_window(|| 1 + 1);
/// assert_eq!(n, 2);
/// ```
///
/// # Notes
/// - Keep the window short: the default capture path holds it for at most
///   the activity check plus the capture timeout (12 ms).
/// - Without the feature the closure simply runs; the caller is then
///   responsible for keeping the task from being preempted.
#[cfg(feature = "critical-window")]
pub fn capture_window<R>(f: impl FnOnce() -> R) -> R {
    critical_section::with(|_cs| f())
}

/// Runs `f` as one uninterrupted capture window.
///
/// Built without the `critical-window` feature: the closure simply runs and
/// the caller must keep the task from being preempted.
#[cfg(not(feature = "critical-window"))]
pub fn capture_window<R>(f: impl FnOnce() -> R) -> R {
    f()
}
