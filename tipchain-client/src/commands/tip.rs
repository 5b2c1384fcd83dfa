//! Tip and retry-record commands

use anyhow::Result;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::tip::TipCommitProtocol;

use super::{
    open_session, print_error, print_success, print_warning, prompt_confirm, recovery_hint,
    require_identity,
};

/// Run the tip command
pub async fn run(
    config: ClientConfig,
    recipient: &str,
    amount: Option<&str>,
    message: Option<&str>,
    skip_confirm: bool,
) -> Result<()> {
    let session = open_session(config).await?;
    if require_identity(&session).is_none() {
        return Ok(());
    }

    let mut protocol = session.tip_protocol()?;
    protocol.balance_mut().refresh().await?;

    if let Some(amount) = amount {
        protocol.set_amount(amount);
    } else {
        let default_amount = protocol.form().amount.clone();
        protocol.set_amount(&default_amount);
    }
    if let Some(message) = message {
        protocol.set_message(message);
    }

    let codec = protocol.balance().codec().clone();
    let balance = protocol.balance();
    println!();
    println!("Tip @{}", recipient.trim().trim_start_matches('@'));
    println!(
        "  Amount:        {} {}",
        protocol.form().amount,
        codec.display_denom()
    );
    println!(
        "  Balance:       {}",
        codec.format(balance.confirmed_amount().unwrap_or(0))
    );
    println!(
        "  After tip:     {}",
        codec.format(balance.predicted_amount())
    );
    if !protocol.form().message.is_empty() {
        println!("  Message:       {}", protocol.form().message);
    }
    println!();

    if !skip_confirm && !prompt_confirm("Send this tip?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let recipient = recipient.trim().trim_start_matches('@').to_string();
    match protocol.submit_form(&recipient).await {
        Ok(receipt) => {
            print_success(&format!(
                "Sent {} to @{}",
                codec.format(receipt.amount_minimal),
                receipt.recipient_username
            ));
            println!("  Transfer: {}", receipt.transfer_tx);
            println!("  Record:   {}", receipt.record_tx);
            if let Some(balance) = protocol.balance().confirmed_amount() {
                println!("  Balance:  {}", codec.format(balance));
            }
        }
        Err(e) => report_failure(&session, &protocol, &e)?,
    }

    Ok(())
}

/// Run the retry-record command
pub async fn retry(config: ClientConfig) -> Result<()> {
    let session = open_session(config).await?;
    let Some(identity) = require_identity(&session) else {
        return Ok(());
    };

    let store = session.pending_records();
    let pending: Vec<_> = store
        .load()?
        .into_iter()
        .filter(|r| r.sender == identity)
        .collect();

    if pending.is_empty() {
        print_success("No pending tip records.");
        return Ok(());
    }

    let mut protocol = session.tip_protocol()?;
    let codec = protocol.balance().codec().clone();
    let mut recorded = 0;

    for record in pending {
        let transfer_tx = record.transfer_tx.clone();
        protocol.restore_pending(record)?;

        match protocol.retry_record().await {
            Ok(receipt) => {
                store.remove(&transfer_tx)?;
                recorded += 1;
                print_success(&format!(
                    "Recorded tip of {} to @{}",
                    codec.format(receipt.amount_minimal),
                    receipt.recipient_username
                ));
            }
            Err(e) => {
                print_warning(&format!("Transfer {}: {}", transfer_tx, e));
                // Still in the store; release it so the next record can load
                protocol.take_pending();
            }
        }
    }

    println!();
    println!("{} record(s) confirmed.", recorded);
    Ok(())
}

fn report_failure(
    session: &crate::session::Session,
    protocol: &TipCommitProtocol,
    err: &Error,
) -> Result<()> {
    match err {
        Error::RecordFailed { tx_hash, .. } if err.value_moved() => {
            print_warning(&err.to_string());
            if let Some(tx_hash) = tx_hash {
                println!("  Transfer: {}", tx_hash);
            }
            if let Some(record) = protocol.pending_record() {
                session.pending_records().push(record.clone())?;
            }
        }
        Error::TransferFailed(_) => {
            print_error(&err.to_string());
            println!("  No funds were moved.");
        }
        _ => print_error(&err.to_string()),
    }

    if let Some(action) = err.recovery_action() {
        println!("  {}", recovery_hint(action));
    }
    Ok(())
}
