// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
// ABOUTME: Output formatting helpers for healthsync-admin
// ABOUTME: Provides consistent display functions for replay reports, failures, and dead letters

use healthsync_server::{models::RawWebhook, queue::DeadLetter, replay::ReplayReport};

/// Display the result of a replay run
pub fn display_replay_report(title: &str, report: &ReplayReport) {
    println!("\n{title}");
    println!("{}", "=".repeat(50));
    println!("   Scanned:  {}", report.scanned);
    println!("   Enqueued: {}", report.enqueued);
    println!("   Failed:   {}", report.failed);
    println!("   Skipped:  {}", report.skipped.len());
    for skipped in &report.skipped {
        println!("      {} - {}", skipped.raw_webhook_id, skipped.reason);
    }
}

/// Display raw webhooks with a recorded error
pub fn display_failed_rows(rows: &[RawWebhook]) {
    if rows.is_empty() {
        println!("No failed raw webhooks");
        return;
    }

    println!("\nFailed raw webhooks ({})", rows.len());
    println!("{}", "=".repeat(80));
    for row in rows {
        println!(
            "{}  {}  {:<18} user={}  processed={}",
            row.id,
            row.received_at.format("%Y-%m-%d %H:%M:%S UTC"),
            row.data_structure,
            row.external_user_id,
            row.processed
        );
        if let Some(error) = &row.error {
            println!("      error: {error}");
        }
    }
}

/// Display dead-lettered messages
pub fn display_dead_letters(dead_letters: &[DeadLetter]) {
    if dead_letters.is_empty() {
        println!("Dead-letter channel is empty");
        return;
    }

    println!("\nDead-lettered messages ({})", dead_letters.len());
    println!("{}", "=".repeat(80));
    for dead_letter in dead_letters {
        println!(
            "{}  {}  receives={}  reason={}",
            dead_letter.id,
            dead_letter.dead_lettered_at.format("%Y-%m-%d %H:%M:%S UTC"),
            dead_letter.receive_count,
            dead_letter.reason
        );
    }
}
