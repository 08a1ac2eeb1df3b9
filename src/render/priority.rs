/// Niceness applied to render worker threads.
pub(crate) const WORKER_NICENESS: i32 = 10;

/// Lower the scheduling priority of the calling thread.
///
/// On Linux the nice value is per thread, so only the worker itself is affected. Elsewhere this is
/// a no-op that reports `false`.
#[cfg(any(target_os = "linux", target_os = "android"))]
#[allow(unsafe_code)]
pub(crate) fn lower_current_thread_priority() -> bool {
    // SAFETY: setpriority takes plain integers and touches no memory we own; `who == 0` selects
    // the calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, WORKER_NICENESS) };
    rc == 0
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) fn lower_current_thread_priority() -> bool {
    false
}
