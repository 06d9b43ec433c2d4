//! Plain-text rendering of a `Report`.

use std::fmt::Write;

use super::{Report, shorten};

const BAR_WIDTH: usize = 30;
const SUMMARY_CHARS: usize = 80;

fn bar(count: usize, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let len = (count * BAR_WIDTH).div_ceil(max);
    "#".repeat(len)
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{title}\n{}", "-".repeat(title.chars().count()));
}

/// Render the report as a multi-section text page.
pub fn render(report: &Report) -> String {
    let mut out = String::new();

    if let Some(digest) = &report.digest {
        section(&mut out, "Digest");
        let _ = writeln!(out, "{digest}");
    }

    let o = &report.overview;
    section(&mut out, "Overview");
    let _ = writeln!(out, "Total emails:   {}", o.total);
    let _ = writeln!(out, "Unique senders: {}", o.unique_senders);
    let _ = writeln!(out, "Categories:     {}", o.categories);
    let _ = writeln!(out, "Avg priority:   {:.1}", o.avg_priority);

    if !report.trend.is_empty() {
        section(&mut out, "Emails over time");
        let max = report.trend.iter().map(|(_, c)| *c).max().unwrap_or(0);
        for (date, count) in &report.trend {
            let _ = writeln!(out, "{date}  {count:>4}  {}", bar(*count, max));
        }
    }

    section(&mut out, "Categories");
    let max = report.categories.first().map(|(_, c)| *c).unwrap_or(0);
    for (category, count) in &report.categories {
        let _ = writeln!(out, "{category:<16} {count:>4}  {}", bar(*count, max));
    }

    section(&mut out, "Top senders");
    let max = report.top_senders.first().map(|(_, c)| *c).unwrap_or(0);
    for (sender, count) in &report.top_senders {
        let _ = writeln!(out, "{sender:<24} {count:>4}  {}", bar(*count, max));
    }

    section(&mut out, "Email summaries");
    if report.rows.is_empty() {
        let _ = writeln!(out, "(no rows match the filter)");
    }
    for row in &report.rows {
        let date = row
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "----------".to_string());
        let _ = writeln!(
            out,
            "{date}  [{}] P{}  {}: {}",
            row.category,
            row.priority,
            shorten(&row.sender_name, 20),
            row.subject
        );
        let _ = writeln!(out, "            {}", shorten(&row.summary, SUMMARY_CHARS));
    }
    let _ = writeln!(
        out,
        "\n{} of {} rows. Categories: {}",
        report.rows.len(),
        o.total,
        report.category_options.join(", ")
    );

    out
}
