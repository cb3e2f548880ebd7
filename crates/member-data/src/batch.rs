//! Batch driver: walks account summaries and aggregates each account.
//!
//! Nothing here aborts a run. Unavailable accounts are skipped, and a failed
//! page ends the walk with the cause recorded in [`BatchReport`].

use futures::{StreamExt, stream};
use members::Account;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::neon::payload::parse_account_summary;
use crate::neon::{AccountQuery, AccountSummary, NeonClient};

const PROGRESS_EVERY: usize = 50;

/// Outcome of one batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub pages: u32,
    pub accounts_delivered: usize,
    /// Accounts whose detail could not be fetched or parsed.
    pub accounts_skipped: usize,
    /// Listing rows that were not individual accounts or had no id.
    pub rows_ignored: usize,
    /// Set when a summary page failed and the walk stopped early.
    pub page_error: Option<ApiError>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.page_error.is_none()
    }
}

pub struct BatchDriver {
    client: NeonClient,
    account_concurrency: usize,
}

impl BatchDriver {
    pub fn new(client: NeonClient, account_concurrency: usize) -> Self {
        Self {
            client,
            account_concurrency: account_concurrency.max(1),
        }
    }

    /// Aggregates every account matched by `query`, sending each to `sink`.
    ///
    /// With a concurrency of 1 accounts arrive in listing order. Stops early
    /// if the receiver is dropped.
    pub async fn run(&self, query: &AccountQuery, sink: mpsc::Sender<Account>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut pages = self.client.account_pages(query);

        'pages: while let Some(page) = pages.next_page().await {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    report.page_error = Some(e);
                    break;
                }
            };
            report.pages += 1;

            let summaries = self.summaries(&page.items, &mut report);
            let mut accounts = stream::iter(summaries)
                .map(|summary| async move {
                    let result = self.client.account(&summary).await;
                    (summary, result)
                })
                .buffer_unordered(self.account_concurrency);

            while let Some((summary, result)) = accounts.next().await {
                match result {
                    Ok(account) => {
                        if sink.send(account).await.is_err() {
                            warn!("account receiver dropped, stopping batch");
                            break 'pages;
                        }
                        report.accounts_delivered += 1;
                    }
                    Err(e) => {
                        warn!(
                            account_id = %summary.id,
                            kind = ?e.kind(),
                            error = %e,
                            "skipping unavailable account"
                        );
                        report.accounts_skipped += 1;
                    }
                }

                let processed = report.accounts_delivered + report.accounts_skipped;
                if processed % PROGRESS_EVERY == 0 {
                    info!(
                        processed,
                        delivered = report.accounts_delivered,
                        "batch progress"
                    );
                }
            }
        }

        info!(
            pages = report.pages,
            delivered = report.accounts_delivered,
            skipped = report.accounts_skipped,
            ignored = report.rows_ignored,
            complete = report.is_complete(),
            "batch finished"
        );
        report
    }

    /// Runs the batch and gathers every account in memory.
    pub async fn collect(&self, query: &AccountQuery) -> (Vec<Account>, BatchReport) {
        let (tx, mut rx) = mpsc::channel::<Account>(self.account_concurrency * 2);
        let gather = async move {
            let mut accounts = Vec::new();
            while let Some(account) = rx.recv().await {
                accounts.push(account);
            }
            accounts
        };
        let (report, accounts) = tokio::join!(self.run(query, tx), gather);
        (accounts, report)
    }

    fn summaries(&self, rows: &[Value], report: &mut BatchReport) -> Vec<AccountSummary> {
        rows.iter()
            .filter_map(|row| match parse_account_summary(row) {
                Ok(summary) if summary.is_individual() => Some(summary),
                Ok(summary) => {
                    report.rows_ignored += 1;
                    debug!(account_id = %summary.id, "ignoring non-individual account");
                    None
                }
                Err(e) => {
                    report.rows_ignored += 1;
                    warn!(error = %e, raw = %row, "ignoring unreadable account row");
                    None
                }
            })
            .collect()
    }
}
