//! Pulls member histories from Neon CRM and writes one JSON record per line.
//!
//! Run with:
//! ```
//! NEON_API_USER=... NEON_API_KEY=... cargo run -p member-data --bin pull > members.jsonl
//! ```

use std::io::Write;

use anyhow::Context;
use member_data::prelude::*;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct MemberRecord<'a> {
    account: &'a Account,
    metrics: DerivedMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    forum: Option<ForumActivity>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PullConfig::from_env().context("reading configuration")?;
    tracing::info!(?config, "Starting pull");

    let neon = NeonClient::from_config(&config)?;
    let discourse = config
        .discourse
        .as_ref()
        .map(|d| DiscourseClient::from_config(d, config.retry, config.request_timeout))
        .transpose()?;

    let driver = BatchDriver::new(neon, config.account_concurrency);
    let (tx, mut rx) = mpsc::channel::<Account>(config.account_concurrency * 2);
    let query = AccountQuery::members();

    // Owns the receiver so a write failure also stops the driver.
    let write = async move {
        let mut out = std::io::BufWriter::new(std::io::stdout().lock());
        while let Some(account) = rx.recv().await {
            let forum = match (&discourse, account.profile.discourse_id.as_deref()) {
                (Some(client), Some(forum_user)) => client
                    .user_activity(forum_user)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            account_id = %account.id,
                            error = %e,
                            "forum stats unavailable"
                        )
                    })
                    .ok(),
                _ => None,
            };
            let record = MemberRecord {
                metrics: account.derived_metrics(),
                account: &account,
                forum,
            };
            serde_json::to_writer(&mut out, &record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        anyhow::Ok(())
    };

    let (report, written) = tokio::join!(driver.run(&query, tx), write);
    written.context("writing member records")?;

    tracing::info!("Pull completed!");
    tracing::info!("  Pages: {}", report.pages);
    tracing::info!("  Accounts written: {}", report.accounts_delivered);
    tracing::info!("  Accounts skipped: {}", report.accounts_skipped);
    tracing::info!("  Rows ignored: {}", report.rows_ignored);
    if let Some(e) = &report.page_error {
        tracing::error!(kind = ?e.kind(), error = %e, "Account listing ended early");
    }

    Ok(())
}
