//! Balance check command

use anyhow::Result;

use crate::config::ClientConfig;

use super::{open_session, print_success, print_warning, require_identity};

/// Run the balance command
pub async fn run(config: ClientConfig) -> Result<()> {
    let session = open_session(config).await?;
    let Some(identity) = require_identity(&session) else {
        return Ok(());
    };

    let mut tracker = session.balance_tracker()?;
    let confirmed = tracker.refresh().await?;

    println!();
    print_success(&format!("Balance: {}", tracker.codec().format(confirmed)));
    println!("Wallet: {}", identity);

    let pending: Vec<_> = session
        .pending_records()
        .load()?
        .into_iter()
        .filter(|r| r.sender == identity)
        .collect();
    if !pending.is_empty() {
        println!();
        print_warning(&format!(
            "{} tip(s) sent but not yet recorded. Run 'tipchain retry-record'.",
            pending.len()
        ));
    }

    Ok(())
}
