use colored::Colorize;
use std::time::Duration;
use strscout::search::TRUNCATION_MARKER;
use strscout::{MatchRecord, ReportSet, SearchConfig, SearchOutcome};

/// Colors the hits of a record green and dims the truncation marker
pub fn highlight(record: &MatchRecord) -> String {
    let line = record.line_content.as_str();
    let (body, marker) = if record.truncated {
        (
            line.strip_suffix(TRUNCATION_MARKER).unwrap_or(line),
            Some(TRUNCATION_MARKER),
        )
    } else {
        (line, None)
    };

    let mut out = String::with_capacity(line.len() + 16 * record.spans.len());
    let mut cursor = 0;
    for &(start, end) in &record.spans {
        if start < cursor || end > body.len() {
            continue;
        }
        let (Some(before), Some(hit)) = (body.get(cursor..start), body.get(start..end)) else {
            continue;
        };
        out.push_str(before);
        out.push_str(&hit.green().bold().to_string());
        cursor = end;
    }
    out.push_str(body.get(cursor..).unwrap_or_default());
    if let Some(marker) = marker {
        out.push_str(&marker.dimmed().to_string());
    }
    out
}

pub fn print_matches(report: &ReportSet) {
    for file in report.files() {
        let modified = file
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M:%S%:z").to_string())
            .unwrap_or_else(|| "unknown".to_string());

        for record in &file.records {
            println!(
                "{} - {} ({})",
                file.path.display().to_string().yellow(),
                format!("Line {}", record.line_number).cyan(),
                modified.magenta()
            );
            println!("{}\n", highlight(record));
        }
    }
}

pub fn print_summary(config: &SearchConfig, outcome: &SearchOutcome, elapsed: Duration) {
    let summary = &outcome.summary;

    if summary.cancelled {
        println!("{}", "Search cancelled, showing partial results".yellow());
    }

    println!(
        "{}",
        format!(
            "Crawled {} directories at a max depth of {}. Found {} matches in {} files for search term '{}'.",
            summary.directories_visited,
            config.max_depth(),
            summary.total_matches,
            summary.files_with_matches,
            config.term()
        )
        .blue()
    );
    println!("Files scanned: {}", summary.files_scanned);

    if summary.skipped.total() > 0 {
        let tally: Vec<String> = summary
            .skipped
            .iter()
            .map(|(reason, count)| format!("{} {}", count, reason))
            .collect();
        println!("Files skipped: {}", tally.join(", "));
    }
    if summary.walk_warnings > 0 {
        println!(
            "{}",
            format!("{} directory warnings (see log)", summary.walk_warnings).yellow()
        );
    }

    // Whole milliseconds keep the output short
    let elapsed = Duration::from_millis(elapsed.as_millis() as u64);
    println!("Elapsed time: {}", humantime::format_duration(elapsed));
}
