//! The render loop: moves playback forward, one item at a time.
//!
//! The loop never fetches or waits on anything but the clock and the state
//! channel, so a slow backend can never freeze the screen.

use crate::state::PlayerState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

fn dwell(seconds: u32) -> Duration {
    Duration::from_secs(u64::from(seconds.max(1)))
}

pub(crate) async fn render_loop(state: Arc<watch::Sender<PlayerState>>) {
    let mut rx = state.subscribe();
    loop {
        let (epoch, current) = {
            let current = rx.borrow_and_update();
            let item = current.snapshot.as_ref().and_then(|s| s.item(current.current_index));
            (current.epoch, item.map(|item| dwell(item.duration)))
        };
        let Some(dwell) = current else {
            // Nothing to show; wait for something to change.
            if rx.changed().await.is_err() {
                return;
            }
            continue;
        };
        let deadline = Instant::now() + dwell;
        let restarted = loop {
            tokio::select! {
                () = sleep_until(deadline) => break false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if rx.borrow_and_update().epoch != epoch {
                        break true;
                    }
                }
            }
        };
        if !restarted {
            advance(&state, epoch);
        }
    }
}

/// Step to the next item, wrapping to the start. Does nothing if playback
/// was restarted in the meantime.
fn advance(state: &watch::Sender<PlayerState>, epoch: u64) {
    state.send_if_modified(|state| {
        if state.epoch != epoch {
            return false;
        }
        let Some(len) = state.snapshot.as_ref().map(|s| s.len()).filter(|len| *len > 0) else {
            return false;
        };
        state.current_index = (state.current_index + 1) % len;
        state.advanced += 1;
        tracing::trace!(index = state.current_index, "Advanced playback");
        true
    });
}
