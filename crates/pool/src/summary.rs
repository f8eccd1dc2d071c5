use crate::job::{Outcome, Recorded};

/// Tally of one scan pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Objects returned by the listing
    pub listed: usize,
    /// Listing entries dropped because their key appeared more than once
    pub duplicates: usize,
    /// Objects the ledger already covered
    pub skipped: usize,
    /// Objects the scanner chain ran over
    pub scanned: usize,
    pub download_failures: usize,
    pub delivery_failures: usize,
    /// Scanned objects whose ledger update failed
    pub ledger_failures: usize,
    /// Scanned objects deliberately left out of the ledger after a failed
    /// delivery
    pub withheld: usize,
    /// Jobs still queued when the pass was cancelled
    pub unprocessed: usize,
}

impl Summary {
    pub(crate) fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped => self.skipped += 1,
            Outcome::DownloadFailed => self.download_failures += 1,
            Outcome::Scanned { delivered, recorded } => {
                self.scanned += 1;
                if !delivered {
                    self.delivery_failures += 1;
                }
                match recorded {
                    Recorded::Ledger(_) => {},
                    Recorded::Withheld => self.withheld += 1,
                    Recorded::Failed => self.ledger_failures += 1,
                }
            },
        }
    }

    /// Fold a single worker's tally into the pass total.
    pub(crate) fn merge(&mut self, other: Summary) {
        self.skipped += other.skipped;
        self.scanned += other.scanned;
        self.download_failures += other.download_failures;
        self.delivery_failures += other.delivery_failures;
        self.ledger_failures += other.ledger_failures;
        self.withheld += other.withheld;
    }

    /// Jobs that were picked up by a worker.
    pub fn attempted(&self) -> usize {
        self.skipped + self.scanned + self.download_failures
    }
}
