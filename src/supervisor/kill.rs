use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

const TERM_GRACE: Duration = Duration::from_millis(100);

/// Terminate a child and all of its descendants. The child is spawned in its
/// own process group, so on unix a group signal reaches helper processes the
/// binary may have forked. Group-signal failures are non-fatal; the top-level
/// kill below is the portable fallback and always runs.
pub async fn terminate_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            if libc::killpg(pid as i32, libc::SIGTERM) != 0 {
                warn!(
                    "failed to signal process group {}: {}",
                    pid,
                    std::io::Error::last_os_error()
                );
            }
        }
        tokio::time::sleep(TERM_GRACE).await;
        unsafe {
            let _ = libc::killpg(pid as i32, libc::SIGKILL);
        }
    }

    // kill() also reaps the child, so no zombie is left behind.
    match child.kill().await {
        Ok(()) => debug!("child process terminated"),
        Err(e) => debug!("child process already gone: {}", e),
    }
}
