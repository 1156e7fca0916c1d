//! Console progress indicator.
//!
//! A rotating glyph on stderr while a migration is in flight. The ticker
//! task is owned: its lifetime is scoped to the run, and it is stopped
//! deterministically on success, error, or drop of the handle.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const GLYPHS: [char; 4] = ['-', '\\', '|', '/'];
const TICK: Duration = Duration::from_millis(100);

/// Handle to a running progress ticker.
pub struct ProgressTicker {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTicker {
    /// Spawn the ticker task.
    pub fn start() -> Self {
        let token = CancellationToken::new();
        let ticker_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            let mut i = 0usize;
            loop {
                tokio::select! {
                    _ = ticker_token.cancelled() => {
                        eprint!("\r \r");
                        break;
                    }
                    _ = interval.tick() => {
                        eprint!("\r{}", GLYPHS[i % GLYPHS.len()]);
                        i += 1;
                    }
                }
            }
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for its final erase of the glyph.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        // Early returns still stop the ticker task.
        self.token.cancel();
    }
}
