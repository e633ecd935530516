//! Plain-text rendering of a stats report.

use comfy_table::presets::ASCII_FULL_CONDENSED;
use comfy_table::{Cell, CellAlignment, Table};

use crate::stats::StatsReport;

/// Render the report as an ASCII table with a `Graph | Size [| Depth]` header.
///
/// Graph names are left-aligned, numbers right-aligned. Output ends with a
/// newline.
pub fn render_table(report: &StatsReport, include_depth: bool) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL_CONDENSED);

    let mut header = vec!["Graph", "Size"];
    if include_depth {
        header.push("Depth");
    }
    table.set_header(header);

    for row in report.rows() {
        let mut cells = vec![Cell::new(&row.graph), number(row.size)];
        if include_depth {
            cells.push(match row.depth {
                Some(depth) => number(depth),
                None => Cell::new(""),
            });
        }
        table.add_row(cells);
    }

    format!("{table}\n")
}

fn number(value: usize) -> Cell {
    Cell::new(value).set_alignment(CellAlignment::Right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::GraphStats;

    fn row(graph: &str, size: usize, depth: Option<usize>) -> GraphStats {
        GraphStats {
            graph: graph.to_string(),
            size,
            depth,
        }
    }

    fn line_with<'a>(out: &'a str, needle: &str) -> &'a str {
        out.lines()
            .find(|line| line.contains(needle))
            .unwrap_or_else(|| panic!("no line with {needle} in\n{out}"))
    }

    #[test]
    fn render_size_only() {
        let report = StatsReport {
            rows: vec![row("DEFAULT", 0, None), row("http://ex.org/g1", 1234, None)],
        };
        let out = render_table(&report, false);

        assert!(out.ends_with('\n'));
        assert!(out.starts_with('+'));
        let header = line_with(&out, "Graph");
        assert!(header.contains("Size"));
        assert!(!header.contains("Depth"));

        assert!(line_with(&out, "DEFAULT").starts_with("| DEFAULT "));
        assert!(line_with(&out, "DEFAULT").ends_with("|    0 |"));
        assert!(line_with(&out, "http://ex.org/g1").ends_with("| 1234 |"));

        // every line has the same width
        let widths: Vec<usize> = out.lines().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{out}");
    }

    #[test]
    fn render_with_depth() {
        let report = StatsReport {
            rows: vec![row("g", 7, Some(2)), row("h", 10, Some(12))],
        };
        let out = render_table(&report, true);

        assert!(line_with(&out, "Graph").contains("Depth"));
        assert!(line_with(&out, "| g ").ends_with("|    7 |     2 |"));
        assert!(line_with(&out, "| h ").ends_with("|   10 |    12 |"));
    }

    #[test]
    fn render_rows_in_report_order() {
        let report = StatsReport {
            rows: vec![row("DEFAULT", 0, None), row("alpha", 1, None), row("zeta", 2, None)],
        };
        let out = render_table(&report, false);

        let position = |graph: &str| out.find(graph).unwrap();
        assert!(position("DEFAULT") < position("alpha"));
        assert!(position("alpha") < position("zeta"));
    }

    #[test]
    fn render_empty_report() {
        let out = render_table(&StatsReport::default(), false);
        assert!(line_with(&out, "Graph").contains("Size"));
        assert!(!out.contains("DEFAULT"));
    }
}
