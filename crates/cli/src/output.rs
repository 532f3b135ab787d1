use anyhow::Result;
use serde::Serialize;

use programsync_core::{BusinessOption, Program};
use programsync_sync::{CacheView, Diagnostics, KeyRefresh};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One row of `programsync list`.
pub fn program_line(program: &Program) -> String {
    let businesses: Vec<&str> = program
        .businesses
        .iter()
        .filter_map(|b| b.name.as_deref().or_else(|| b.aliases.first().map(String::as_str)))
        .collect();
    format!(
        "{:<14} {:<9} {:<10} {:<32} {}",
        program.id,
        program.status.as_str(),
        program.program_type,
        program.name.as_deref().unwrap_or("-"),
        businesses.join(", ")
    )
}

pub fn option_line(option: &BusinessOption) -> String {
    format!(
        "{:<40} {:>4} programs  aliases: {}",
        option.label(),
        option.member_record_count,
        option.aliases.join(", ")
    )
}

/// Header for a list: count, total and freshness of the cached entry.
pub fn view_header(view: &CacheView, shown: usize) -> String {
    let freshness = if view.is_fresh { "fresh" } else { "stale" };
    format!(
        "{}: showing {shown} of {} loaded ({} total), fetched {}, {freshness}",
        view.key,
        view.records.len(),
        view.total_count,
        view.fetched_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Notice for data the server flagged as degraded.
pub fn degraded_notice(diagnostics: &Diagnostics) -> Option<String> {
    if !diagnostics.is_degraded() {
        return None;
    }
    let mut parts = Vec::new();
    if diagnostics.served_from_fallback == Some(true) {
        parts.push("served from cache".to_string());
    }
    if let Some(n) = diagnostics.stale_count.filter(|n| *n > 0) {
        parts.push(format!("{n} stale"));
    }
    if let Some(warning) = &diagnostics.warning {
        parts.push(warning.clone());
    }
    Some(format!("Warning: {}", parts.join("; ")))
}

pub fn refresh_line(refresh: &KeyRefresh) -> String {
    match &refresh.result {
        Ok(entry) if entry.is_truncated() => format!(
            "  {:<10} {} of {} programs (incomplete)",
            refresh.key,
            entry.records.len(),
            entry.total_count
        ),
        Ok(entry) => format!("  {:<10} {} programs", refresh.key, entry.records.len()),
        Err(e) => format!("  {:<10} failed: {e}", refresh.key),
    }
}
