use std::io::Write;

use owo_colors::OwoColorize;
use textlens_core::{AnalysisResult, PipelineRecord};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the line announcing which file is being processed.
pub fn print_extraction_header(
    w: &mut dyn Write,
    file_name: &str,
    media_type: &str,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "Extracting text from {} ({})",
            file_name.bold(),
            media_type.dimmed()
        )?;
    } else {
        writeln!(w, "Extracting text from {} ({})", file_name, media_type)?;
    }
    Ok(())
}

/// Print extracted text under a heading.
pub fn print_text(w: &mut dyn Write, text: &str, color: ColorMode) -> std::io::Result<()> {
    print_heading(w, "Extracted text", color)?;
    if text.trim().is_empty() {
        if color.enabled() {
            writeln!(w, "{}", "(no text found)".dimmed())?;
        } else {
            writeln!(w, "(no text found)")?;
        }
    } else {
        writeln!(w, "{}", text.trim_end())?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print the analysis block: sentiment, counts, keywords and suggestions.
pub fn print_analysis(
    w: &mut dyn Write,
    analysis: &AnalysisResult,
    color: ColorMode,
) -> std::io::Result<()> {
    print_heading(w, "Analysis", color)?;

    if color.enabled() {
        writeln!(w, "  Sentiment:  {}", analysis.sentiment.to_string().green())?;
    } else {
        writeln!(w, "  Sentiment:  {}", analysis.sentiment)?;
    }
    writeln!(w, "  Words:      {}", analysis.word_count)?;
    writeln!(w, "  Sentences:  {}", analysis.sentence_count)?;
    writeln!(
        w,
        "  Keywords:   {}",
        if analysis.keywords.is_empty() {
            "(none)".to_string()
        } else {
            analysis.keywords.join(", ")
        }
    )?;

    if !analysis.suggestions.is_empty() {
        writeln!(w)?;
        writeln!(w, "  Suggestions:")?;
        for suggestion in &analysis.suggestions {
            if color.enabled() {
                writeln!(w, "    {} {}", "-".cyan(), suggestion)?;
            } else {
                writeln!(w, "    - {}", suggestion)?;
            }
        }
    }
    Ok(())
}

/// Print one line per history record, newest last.
///
/// Indices are 1-based to match `history show` and `history delete`.
pub fn print_history_list(
    w: &mut dyn Write,
    records: &[PipelineRecord],
    color: ColorMode,
) -> std::io::Result<()> {
    if records.is_empty() {
        writeln!(w, "No extraction history yet.")?;
        return Ok(());
    }

    for (i, record) in records.iter().enumerate() {
        let when = format_timestamp(record);
        let preview = truncate(first_line(&record.text), 60);
        if color.enabled() {
            writeln!(
                w,
                "{} {}  {}",
                format!("[{}]", i + 1).bold().yellow(),
                when.dimmed(),
                preview
            )?;
        } else {
            writeln!(w, "[{}] {}  {}", i + 1, when, preview)?;
        }
    }
    writeln!(w)?;
    writeln!(w, "Total: {} record(s)", records.len())?;
    Ok(())
}

/// Print a single history record in full.
pub fn print_record(
    w: &mut dyn Write,
    index: usize,
    record: &PipelineRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {}",
            format!("[{}]", index).bold().yellow(),
            format_timestamp(record).dimmed()
        )?;
    } else {
        writeln!(w, "[{}] {}", index, format_timestamp(record))?;
    }
    writeln!(w)?;
    print_text(w, &record.text, color)?;
    match record.analysis {
        Some(ref analysis) => print_analysis(w, analysis, color)?,
        None => writeln!(w, "(no analysis stored for this record)")?,
    }
    Ok(())
}

pub fn print_warning(w: &mut dyn Write, message: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "WARNING:".yellow(), message)
    } else {
        writeln!(w, "WARNING: {}", message)
    }
}

pub fn print_error(w: &mut dyn Write, message: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", message.red().bold())
    } else {
        writeln!(w, "{}", message)
    }
}

fn print_heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", title.bold().cyan())?;
    } else {
        writeln!(w, "{}", title)?;
        writeln!(w, "{}", "-".repeat(title.len()))?;
    }
    Ok(())
}

fn format_timestamp(record: &PipelineRecord) -> String {
    record.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}
