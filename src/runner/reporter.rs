use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::perf::CallPerformance;
use crate::runner::types::{CallReport, SequenceReport, SuiteReport, TestSummary};
use crate::utils::{ResponseFormat, ResponseFormatter};

pub struct TestReporter {
    verbose: bool,
    formatter: ResponseFormatter,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        let format = if verbose {
            ResponseFormat::Verbose
        } else {
            ResponseFormat::Compact
        };

        Self {
            verbose,
            formatter: ResponseFormatter::new(format),
        }
    }

    /// 打印整个 suite 的结果与摘要
    pub fn print_report(&self, report: &SuiteReport) {
        println!(
            "\nSuite {} ({})\n",
            report.name.bold(),
            report.suite_id.to_string().dimmed()
        );
        if let Some(failure) = &report.setup_failure {
            println!(" {}: {}\n", "Setup failed".red().bold(), failure);
        }
        for sequence in &report.sequences {
            self.print_sequence(sequence);
        }
        if let Some(failure) = &report.teardown_failure {
            println!(" {}: {}\n", "Teardown failed".red().bold(), failure);
        }
        self.print_summary(&TestSummary::from_report(report));
    }

    pub fn print_sequence(&self, sequence: &SequenceReport) {
        let source = sequence
            .source
            .as_ref()
            .map(|p| format!(" ({})", p.display()))
            .unwrap_or_default();
        println!("{}{}", sequence.name.bold(), source.dimmed());
        for call in &sequence.calls {
            self.print_call(call);
        }
        println!();
    }

    /// 打印单个 Call 的结果
    pub fn print_call(&self, call: &CallReport) {
        if call.skipped {
            println!(
                " {} {} {} {} {}",
                "⊘".dimmed(),
                call.name,
                call.method.cyan(),
                call.url,
                "(skipped)".dimmed()
            );
            return;
        }

        let passed = call.passed();
        let symbol = if passed { "✓".green() } else { "✗".red() };
        let attempts = if call.attempts.len() > 1 {
            format!(", {} attempts", call.attempts.len())
        } else {
            String::new()
        };
        println!(
            " {} {} {} {} ({}ms{})",
            symbol,
            call.name,
            call.method.cyan(),
            call.url,
            call.duration.as_millis(),
            attempts
        );

        if self.verbose {
            let states: Vec<String> = call.states.iter().map(ToString::to_string).collect();
            println!("   {}", states.join(" → ").dimmed());
        }

        if let Some(failure) = &call.failure {
            println!("   {}: {}", "Error".red().bold(), failure);
            if let Some(details) = &call.details {
                for line in details.lines() {
                    println!("     {}", line);
                }
            }
            println!();
        } else if self.verbose {
            if let Some(response) = call.last_response() {
                for line in self.formatter.format(response).lines() {
                    println!("   {}", line);
                }
                println!();
            }
        }
    }

    /// 打印测试摘要
    pub fn print_summary(&self, summary: &TestSummary) {
        println!("{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        println!(
            "  {}: {} passed, {} total",
            "Sequences".bold(),
            summary.passed_sequences.to_string().green(),
            summary.sequences
        );
        if summary.skipped > 0 {
            println!(
                "  {}: {} passed, {} failed, {} skipped, {} total",
                "Calls".bold(),
                summary.passed.to_string().green(),
                summary.failed.to_string().red(),
                summary.skipped.to_string().dimmed(),
                summary.total
            );
        } else if summary.failed == 0 {
            println!(
                "  {}: {} passed, {} total",
                "Calls".bold(),
                summary.passed.to_string().green(),
                summary.total
            );
        } else {
            println!(
                "  {}: {} passed, {} failed, {} total",
                "Calls".bold(),
                summary.passed.to_string().green(),
                summary.failed.to_string().red(),
                summary.total
            );
        }
        println!("  {}: {}", "Attempts".bold(), summary.attempts);
        println!(
            "  {}: {:.3}s",
            "Duration".bold(),
            summary.total_duration.as_secs_f64()
        );
        println!();
    }

    /// 打印每个 Call 的耗时表
    pub fn print_performance(&self, entries: &[CallPerformance]) {
        if entries.is_empty() {
            return;
        }
        println!("{}", "Performance".bold());
        println!("{}", performance_table(entries));
        println!();
    }

    /// `--json`：输出序列化的报告
    pub fn print_json(&self, report: &SuiteReport) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

pub fn performance_table(entries: &[CallPerformance]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Call", "Endpoint", "Time (ms)", "Result"]);

    for entry in entries {
        let millis = entry
            .millis
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        let (result, color) = match entry.success {
            Some(true) => ("pass", Color::Green),
            Some(false) => ("fail", Color::Red),
            None => ("-", Color::Reset),
        };
        table.add_row(vec![
            Cell::new(&entry.name),
            Cell::new(&entry.endpoint).add_attribute(Attribute::Dim),
            Cell::new(millis),
            Cell::new(result).fg(color),
        ]);
    }
    table
}
