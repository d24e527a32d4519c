use graph::{GraphRow, LayoutRow};
use revgraph_core::{GitRef, RefKind};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Glyph set used to draw lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Unicode,
    Ascii,
}

struct Glyphs {
    commit: char,
    placeholder: char,
    vertical: char,
    /// Edge coming down from the right into the node
    join_left: char,
    /// Edge coming down from the left into the node
    join_right: char,
    /// Merge parent leaving to the right of the node
    fork_right: char,
    /// Merge parent leaving to the left of the node
    fork_left: char,
    ellipsis: &'static str,
}

const UNICODE: Glyphs = Glyphs {
    commit: '●',
    placeholder: '○',
    vertical: '│',
    join_left: '╯',
    join_right: '╰',
    fork_right: '╮',
    fork_left: '╭',
    ellipsis: "…",
};

const ASCII: Glyphs = Glyphs {
    commit: '*',
    placeholder: 'o',
    vertical: '|',
    join_left: '/',
    join_right: '\\',
    fork_right: '\\',
    fork_left: '/',
    ellipsis: "...",
};

/// Formats stream rows as single terminal lines
pub struct RowPrinter {
    glyphs: &'static Glyphs,
    width: usize,
}

impl RowPrinter {
    pub fn new(charset: Charset, width: usize) -> Self {
        let glyphs = match charset {
            Charset::Unicode => &UNICODE,
            Charset::Ascii => &ASCII,
        };
        Self { glyphs, width }
    }

    /// Lane glyphs, short id, date, decorations, then the subject cut to fit
    pub fn format(&self, row: &GraphRow) -> String {
        let record = &row.record;
        let mut line = self.lanes(&row.layout);
        line.push_str(&record.id.short());

        if !record.is_artificial() {
            if let Some(date) = chrono::DateTime::from_timestamp(record.commit_date, 0) {
                line.push(' ');
                line.push_str(&date.format("%Y-%m-%d").to_string());
            }
        }

        if !record.refs.is_empty() {
            line.push_str(" (");
            line.push_str(&decorations(&record.refs));
            line.push(')');
        }

        let used = UnicodeWidthStr::width(line.as_str()) + 1;
        if used < self.width {
            line.push(' ');
            line.push_str(&truncate_to_width(
                &record.subject,
                self.width - used,
                self.glyphs.ellipsis,
            ));
        }
        line
    }

    /// One glyph plus a space per lane
    fn lanes(&self, layout: &LayoutRow) -> String {
        let g = self.glyphs;
        let node = layout.node.id;
        let mut cells = vec![' '; layout.width()];

        for &lane in &layout.parent_lanes {
            if lane != layout.node_lane {
                cells[lane] = if lane > layout.node_lane { g.fork_right } else { g.fork_left };
            }
        }
        for edge in layout.edges.iter() {
            cells[edge.origin] = if edge.target != node {
                g.vertical
            } else if edge.origin > layout.node_lane {
                g.join_left
            } else if edge.origin < layout.node_lane {
                g.join_right
            } else {
                cells[edge.origin]
            };
        }
        cells[layout.node_lane] = if layout.node.is_artificial() {
            g.placeholder
        } else {
            g.commit
        };

        let mut out = String::with_capacity(cells.len() * 4);
        for cell in cells {
            out.push(cell);
            out.push(' ');
        }
        out
    }
}

/// `HEAD, main, origin/main, tag: v1.0`
fn decorations(refs: &[GitRef]) -> String {
    refs.iter()
        .map(|r| match r.kind {
            RefKind::Tag => format!("tag: {}", r.name),
            _ => r.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cut `text` to `max_width` columns on grapheme boundaries, marking the cut
/// with `ellipsis` when it fits
pub fn truncate_to_width(text: &str, max_width: usize, ellipsis: &str) -> String {
    if UnicodeWidthStr::width(text) <= max_width {
        return text.to_string();
    }

    let ellipsis_width = UnicodeWidthStr::width(ellipsis);
    let budget = max_width.saturating_sub(ellipsis_width);
    let mut result = String::new();
    let mut current_width = 0;

    for grapheme in text.graphemes(true) {
        let grapheme_width = UnicodeWidthStr::width(grapheme);
        if current_width + grapheme_width > budget {
            break;
        }
        result.push_str(grapheme);
        current_width += grapheme_width;
    }

    if ellipsis_width <= max_width {
        result.push_str(ellipsis);
    }
    result
}
