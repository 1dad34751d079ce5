//! Console activity indicator shown while an item is in flight.

use std::io::Write;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const FRAMES: [char; 4] = ['/', '-', '\\', '|'];

/// Spawns one indicator task per dispatched item
#[derive(Debug, Clone, Copy)]
pub struct ProgressReporter {
    enabled: bool,
    /// Frames per second
    refresh_rate: u32,
}

impl ProgressReporter {
    pub fn new(enabled: bool, refresh_rate: u32) -> Self {
        Self {
            enabled,
            refresh_rate: refresh_rate.max(1),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start the indicator; a disabled reporter spawns nothing
    pub fn start_for(&self, label: impl Into<String>) -> ProgressHandle {
        if !self.enabled {
            return ProgressHandle::inert();
        }

        let label = label.into();
        let period = Duration::from_secs_f64(1.0 / f64::from(self.refresh_rate));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut tick = 0usize;
            let mut width = 0usize;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let frame = render_frame(&label, tick);
                        width = width.max(frame.chars().count());
                        let mut stderr = std::io::stderr();
                        let _ = write!(stderr, "\r{}", frame);
                        let _ = stderr.flush();
                        tick = tick.wrapping_add(1);
                    }
                }
            }
            if width > 0 {
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, "\r{}\r", " ".repeat(width));
                let _ = stderr.flush();
            }
        });

        ProgressHandle {
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// One frame of the indicator
pub fn render_frame(label: &str, tick: usize) -> String {
    format!("{} {}", FRAMES[tick % FRAMES.len()], label)
}

/// Owned by the call site; stop it on every path
#[derive(Debug)]
pub struct ProgressHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProgressHandle {
    fn inert() -> Self {
        Self {
            stop: None,
            task: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the task and wait until it has cleared its line
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "Progress task ended abnormally");
            }
        }
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        // The task exits on its own once the sender is gone
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
