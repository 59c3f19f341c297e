// AI
//! 📊 stats.rs — "So... how did it go?" — the question every pipeline gets at the end.
//!
//! The splitter counts lines, the writer counts documents, and this module stacks
//! both into one [`PipelineReport`] with a comfy-table rendering for humans.
//!
//! 🦆 The duck counted too. The duck got a different number. We don't talk about it.

use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

use crate::splitter::SplitStats;
use crate::workers::WriterStats;

/// 📊 Everything worth knowing once the input hits EOF.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub split: SplitStats,
    pub writer: WriterStats,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// ✅ Nothing failed to deliver. Unknown lines don't count against us, they never got in.
    pub fn is_clean(&self) -> bool {
        self.writer.failed == 0
    }

    /// 🍽️ Two columns, right-aligned numbers, no borders.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows = [
            ("lines", format_number(self.split.lines)),
            ("records", format_number(self.split.records)),
            ("unknown lines", format_number(self.split.unknown)),
            ("inserted", format_number(self.writer.inserted)),
            ("failed", format_number(self.writer.failed)),
            ("local lines", format_number(self.writer.local_lines)),
            ("flushes", format_number(self.writer.flushes)),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }
}

/// 🔢 `1000000` → `1,000,000`. Eyes: you're welcome.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS.mmm, or HH:MM:SS once a run gets long enough to need hours.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, duration.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_their_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_time_is_formatted_for_humans() {
        assert_eq!(format_duration(Duration::from_millis(61_250)), "01:01.250");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_the_table_mentions_everything() {
        let report = PipelineReport {
            split: SplitStats {
                lines: 12_000,
                records: 11_998,
                unknown: 2,
            },
            writer: WriterStats {
                inserted: 11_990,
                failed: 8,
                flushes: 24,
                local_lines: 8,
            },
            elapsed: Duration::from_secs(3),
        };
        let rendered = report.render_table();
        for needle in ["lines", "12,000", "unknown lines", "11,990", "failed", "flushes", "24"] {
            assert!(rendered.contains(needle), "table is missing {needle}:\n{rendered}");
        }
        assert!(!report.is_clean());
    }
}
