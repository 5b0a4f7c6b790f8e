use crate::error::{UbxLogError, UserFriendlyError};
use crate::extractor::{DemuxReport, MalformedRecord, RangeReport};
use console::{style, Emoji, Term};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static SATELLITE: Emoji = Emoji("🛰️  ", "> ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn success(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Success, message),
                OutputMode::Json => self.print_json_message("success", message),
                OutputMode::Plain => println!("SUCCESS: {}", message),
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", SATELLITE, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &UbxLogError) {
        self.error(&error.user_message());

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => eprintln!("SUGGESTION: {}", suggestion),
            }
        }
    }

    pub fn print_range_report(&self, report: &RangeReport) {
        match self.mode {
            OutputMode::Json => self.print_json_report("range_report", report),
            OutputMode::Plain => {
                println!("REPORT: Range extraction completed");
                println!("Input: {}", report.input.display());
                println!("Output: {}", report.output.display());
                println!("Lines: {}", report.lines_read);
                println!("Records: {}", report.records_extracted);
                println!("Rows: {}", report.rows_written);
                println!("Duration: {:?}", report.elapsed);
                if report.has_warnings() {
                    println!("Malformed: {}", report.malformed.len());
                }
            }
            OutputMode::Human => {
                if self.quiet {
                    return;
                }
                self.print_header(if report.dry_run {
                    "Range Extraction (dry run)"
                } else {
                    "Range Extraction"
                });
                println!("  Input:          {}", report.input.display());
                println!("  Output:         {}", report.output.display());
                println!("  Lines read:     {}", self.highlight(report.lines_read));
                println!(
                    "  Raw records:    {}",
                    self.highlight(report.records_extracted)
                );
                println!("  Rows written:   {}", self.highlight(report.rows_written));
                println!("  Other records:  {}", report.lines_ignored);
                if !report.dry_run {
                    println!("  Output size:    {}", format_bytes(report.bytes_written));
                }
                println!("  Time taken:     {}", format_duration(report.elapsed));
                self.print_malformed(&report.malformed);
                self.print_separator();
            }
        }
    }

    pub fn print_demux_report(&self, report: &DemuxReport) {
        match self.mode {
            OutputMode::Json => self.print_json_report("demux_report", report),
            OutputMode::Plain => {
                println!("REPORT: Demultiplexing completed");
                println!("Input: {}", report.input.display());
                println!("Lines: {}", report.lines_read);
                println!("Written: {}", report.lines_written);
                for destination in &report.destinations {
                    println!(
                        "File: {} ({} lines)",
                        destination.path.display(),
                        destination.lines_written
                    );
                }
                println!("Duration: {:?}", report.elapsed);
                if report.has_warnings() {
                    println!("Malformed: {}", report.malformed.len());
                }
            }
            OutputMode::Human => {
                if self.quiet {
                    return;
                }
                self.print_header(if report.dry_run {
                    "Record Demultiplexing (dry run)"
                } else {
                    "Record Demultiplexing"
                });
                println!("  Input:          {}", report.input.display());
                println!("  Lines read:     {}", self.highlight(report.lines_read));
                println!("  Lines written:  {}", self.highlight(report.lines_written));
                println!("  Header-only:    {}", report.key_only_lines);
                println!("  Blank:          {}", report.blank_lines);
                println!("  Time taken:     {}", format_duration(report.elapsed));
                println!();
                println!("  Record types:");
                for destination in &report.destinations {
                    println!(
                        "    {:<16} {:>9} lines  {}",
                        destination.key,
                        destination.lines_written,
                        destination.path.display()
                    );
                }
                self.print_malformed(&report.malformed);
                self.print_separator();
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{}", style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => println!("=== {} ===", title),
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => println!("{}", "-".repeat(60)),
            OutputMode::Json => {}
        }
    }

    fn print_malformed(&self, malformed: &[MalformedRecord]) {
        if malformed.is_empty() {
            return;
        }

        println!();
        let heading = format!("Skipped {} malformed lines:", malformed.len());
        if self.use_colors {
            println!("  {}{}", WARNING, style(heading).yellow().bold());
        } else {
            println!("  {}", heading);
        }
        for record in malformed.iter().take(self.malformed_limit()) {
            println!("    line {}: {}", record.line, record.reason);
        }
        if malformed.len() > self.malformed_limit() {
            println!(
                "    ... {} more (use -vv to list all)",
                malformed.len() - self.malformed_limit()
            );
        }
    }

    fn malformed_limit(&self) -> usize {
        if self.verbose_level >= 2 {
            usize::MAX
        } else {
            10
        }
    }

    fn highlight(&self, value: usize) -> String {
        if self.use_colors {
            style(value).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        if self.use_colors {
            let (emoji, styled) = match msg_type {
                MessageType::Success => (CHECKMARK, style(message).green().bold()),
                MessageType::Error => (CROSS, style(message).red().bold()),
                MessageType::Warning => (WARNING, style(message).yellow().bold()),
                MessageType::Info => (INFO, style(message).cyan()),
            };

            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, styled),
                _ => println!("{}{}", emoji, styled),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_report<T: Serialize>(&self, kind: &str, report: &T) {
        let value = serde_json::json!({
            "type": kind,
            "report": report,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}
