/*!
 * CLI styling helpers
 *
 * Small table/color conventions shared by the `run` summary and `status`
 * output, so both subcommands read consistently.
 */

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::{style, StyledObject};

pub struct Theme;

impl Theme {
    pub fn success<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).green()
    }

    pub fn warning<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).yellow()
    }

    pub fn error<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).red()
    }

    pub fn muted<D: std::fmt::Display>(text: D) -> StyledObject<D> {
        style(text).dim()
    }
}

/// A table using the crate-wide border preset and dynamic column widths.
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Build the per-profile summary table printed at the end of a run.
pub fn profile_summary_table(results: &[parasync::orchestrator::ProfileResult]) -> Table {
    let mut table = create_table();
    table.set_header(vec![
        Cell::new("Profile").add_attribute(Attribute::Bold),
        Cell::new("Chunks"),
        Cell::new("Complete").fg(Color::Green),
        Cell::new("Failed").fg(Color::Red),
        Cell::new("Skipped").fg(Color::Yellow),
        Cell::new("Bytes"),
        Cell::new("Duration"),
    ]);

    for result in results {
        table.add_row(vec![
            Cell::new(&result.profile_name),
            Cell::new(result.chunks_total),
            Cell::new(result.chunks_complete).fg(Color::Green),
            Cell::new(result.chunks_failed).fg(if result.chunks_failed > 0 { Color::Red } else { Color::DarkGrey }),
            Cell::new(result.chunks_skipped).fg(Color::Yellow),
            Cell::new(result.bytes_copied),
            Cell::new(format!("{:.1}s", result.duration.as_secs_f64())),
        ]);
    }

    table
}
