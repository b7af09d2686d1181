use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

/// Progress updates from the worker pool to the single aggregator task.
/// Delivery is asynchronous and unordered; totals only ever grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Init { expected_customers: u64 },
    Customers(u64),
    Campaigns(u64),
    Exit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTotals {
    pub customers: u64,
    pub campaigns: u64,
}

/// Cloneable producer side handed to each worker. Sends never block; a
/// monitor that is already gone just drops the event.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: UnboundedSender<ProgressEvent>,
}

impl ProgressHandle {
    pub fn customers(&self, delta: u64) {
        let _ = self.tx.send(ProgressEvent::Customers(delta));
    }

    pub fn campaigns(&self, delta: u64) {
        let _ = self.tx.send(ProgressEvent::Campaigns(delta));
    }
}

/// Single-consumer aggregator: owns the running totals and the one
/// carriage-return status line, re-rendered after every event.
pub struct ProgressMonitor {
    tx: UnboundedSender<ProgressEvent>,
    task: JoinHandle<ProgressTotals>,
}

impl ProgressMonitor {
    pub fn start(expected_customers: u64) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _ = tx.send(ProgressEvent::Init { expected_customers });

        let task = tokio::spawn(async move {
            let bar = ProgressBar::new_spinner();
            bar.set_style(ProgressStyle::with_template("{msg}").unwrap());

            let mut expected = 0u64;
            let mut totals = ProgressTotals::default();
            while let Some(event) = rx.recv().await {
                match event {
                    ProgressEvent::Init { expected_customers } => expected = expected_customers,
                    ProgressEvent::Customers(delta) => totals.customers += delta,
                    ProgressEvent::Campaigns(delta) => totals.campaigns += delta,
                    ProgressEvent::Exit => break,
                }
                bar.set_message(render(expected, totals));
            }
            // Leave a final newline-terminated line so later output does not
            // land on top of the counter.
            bar.finish_with_message(render(expected, totals));
            totals
        });

        ProgressMonitor { tx, task }
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop the aggregator and wait for the final render, so the caller can
    /// print without intermingling with the progress line.
    pub async fn finish(self) -> ProgressTotals {
        let _ = self.tx.send(ProgressEvent::Exit);
        self.task.await.unwrap_or_default()
    }
}

fn render(expected: u64, totals: ProgressTotals) -> String {
    format!(
        "{}/{} customer(s), {} campaign(s)",
        totals.customers, expected, totals.campaigns
    )
}
