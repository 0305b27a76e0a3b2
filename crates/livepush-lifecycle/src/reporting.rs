use livepush_core::StatusReport;
use livepush_ledger::{LedgerResult, MetadataLedger};
use tracing::{debug, info};

use crate::{StatusSink, UpdateResult};

/// Durable status-report queue.
///
/// At most one failed report is kept (last failure wins). It is re-sent on each
/// readiness or resume signal and stays in the ledger until the host reports a
/// delivery outcome for it.
pub struct ReportingQueue<'a> {
    ledger: &'a MetadataLedger,
    sink: &'a dyn StatusSink,
}

impl<'a> ReportingQueue<'a> {
    pub fn new(ledger: &'a MetadataLedger, sink: &'a dyn StatusSink) -> Self {
        Self { ledger, sink }
    }

    pub fn enqueue_failed(&self, report: StatusReport) -> UpdateResult<()> {
        report.validate()?;
        info!(status = report.status.as_str(), "queueing failed status report for retry");
        self.ledger.save_failed_report(report)?;
        Ok(())
    }

    pub fn enqueue_succeeded(&self, report: StatusReport) -> UpdateResult<()> {
        report.validate()?;
        debug!(status = report.status.as_str(), "status report delivered");
        self.ledger.record_delivered_report(&report)?;
        Ok(())
    }

    pub fn has_failed_report(&self) -> LedgerResult<bool> {
        self.ledger.has_failed_report()
    }

    /// Removes the owed report, for callers that take over its delivery.
    pub fn take_failed_report(&self) -> LedgerResult<Option<StatusReport>> {
        self.ledger.take_failed_report()
    }

    /// Hands `report` to the sink with the previous deployment identity attached.
    ///
    /// A deployment report for the identity already recorded as delivered is
    /// dropped. Returns whether the report was dispatched.
    pub fn send(&self, report: StatusReport) -> LedgerResult<bool> {
        let last_deployment = self.ledger.last_deployment()?;
        if report.status.records_deployment()
            && last_deployment.as_ref() == Some(&report.identity())
        {
            debug!(
                status = report.status.as_str(),
                "skipping report for already recorded deployment"
            );
            return Ok(false);
        }

        let report = report.with_previous(last_deployment.as_ref());
        self.sink.dispatch(&report);
        Ok(true)
    }

    pub fn retry_failed(&self) -> LedgerResult<bool> {
        let Some(report) = self.ledger.failed_report()? else {
            return Ok(false);
        };
        info!(status = report.status.as_str(), "retrying failed status report");
        let dispatched = self.send(report.clone())?;
        if !dispatched {
            // Already delivered under this identity, nothing is owed.
            self.ledger.record_delivered_report(&report)?;
        }
        Ok(dispatched)
    }
}
