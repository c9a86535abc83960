//! Plain-text renderings of poll state and user-facing notices.

use chrono::{DateTime, Utc};
use poll_gateway::{ActivePollSummary, GatewayError, Poll, PollStatus};

const BAR_WIDTH: usize = 30;

pub fn render_summaries(polls: &[ActivePollSummary]) {
    if polls.is_empty() {
        println!("No active polls.");
        return;
    }
    for poll in polls {
        println!("{:#x}  {}", poll.address, poll.title);
        if !poll.description.is_empty() {
            println!("    {}", poll.description);
        }
        println!(
            "    {} votes, ends {}",
            poll.total_votes,
            format_end_time(poll.end_time)
        );
    }
}

pub fn render_poll(poll: &Poll) {
    let active = poll.status() == PollStatus::Pending;
    println!("{} [{}]", poll.title, if active { "Active" } else { "Ended" });
    if !poll.description.is_empty() {
        println!("{}", poll.description);
    }
    println!("Created by {}", short_address(&format!("{:#x}", poll.creator)));
    println!(
        "{} {}",
        if active { "Ends" } else { "Ended" },
        format_end_time(poll.end_time)
    );
    println!("Total votes: {}", poll.total_votes);

    let highest = poll.votes.iter().copied().max().unwrap_or(0);
    for (index, (option, &votes)) in poll.options.iter().zip(&poll.votes).enumerate() {
        let pct = percentage(votes, poll.total_votes);
        let marker = if votes == highest && highest > 0 { " *" } else { "" };
        println!("  [{index}] {option}: {votes} votes ({pct}%){marker}");
        println!("      {}", bar(pct));
    }
}

/// Rounded share of the total, 0 when nobody voted yet.
pub fn percentage(votes: u64, total: u64) -> u64 {
    if total == 0 {
        0
    } else {
        (votes * 100 + total / 2) / total
    }
}

fn bar(pct: u64) -> String {
    let filled = (pct as usize * BAR_WIDTH) / 100;
    format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

pub fn short_address(hex: &str) -> String {
    if hex.len() <= 12 {
        return hex.to_string();
    }
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}

pub fn format_end_time(ts: u64) -> String {
    DateTime::<Utc>::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// What a failed action means for the person retrying it.
pub fn notice(err: &GatewayError) -> String {
    match err {
        GatewayError::WalletUnavailable => {
            "No wallet is configured. Set WALLET_PRIVATE_KEY (or --private-key) to sign transactions."
                .into()
        }
        GatewayError::AuthorizationDenied => {
            "The wallet rejected the request. Approve it and try again.".into()
        }
        GatewayError::TransactionReverted(reason) => {
            format!("The chain rejected the transaction: {reason}")
        }
        GatewayError::ContractUnreadable(address) => format!("No poll found at {address:#x}."),
        GatewayError::OptionNotFound { index, .. } => {
            format!("Option {index} no longer exists on this poll; reload and pick again.")
        }
        GatewayError::RelayMiss(key) => {
            format!("No eligibility proof is stored for {key}; complete identity verification first.")
        }
        GatewayError::MalformedProof(detail) => format!("The stored proof is unusable: {detail}"),
        GatewayError::Transport(detail) => format!("Network problem: {detail}"),
    }
}
