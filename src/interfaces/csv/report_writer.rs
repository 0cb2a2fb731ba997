use crate::domain::transaction::PaymentTransaction;
use crate::error::Result;
use std::io::Write;

/// Writes the final per-transaction report as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(target),
        }
    }

    pub fn write_transactions(&mut self, mut transactions: Vec<PaymentTransaction>) -> Result<()> {
        transactions.sort_by_key(|t| (t.subscription_id, t.started_at));

        self.writer.write_record([
            "transaction_id",
            "subscription_id",
            "status",
            "attempts",
            "finished_at",
            "reason",
        ])?;

        for transaction in transactions {
            self.writer.write_record([
                transaction.id.to_string(),
                transaction.subscription_id.to_string(),
                transaction.status.to_string(),
                transaction.rejected_payment_count.to_string(),
                transaction
                    .finished_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
                transaction.cancellation_reason.unwrap_or_default(),
            ])?;
        }

        self.writer.flush()?;
        Ok(())
    }
}
