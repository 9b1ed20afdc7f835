//! Plain-text rendering of frames and series for `print` and `str`.

use crate::dataset::{DataFrame, Scalar, Series};

const MAX_ROWS: usize = 60;
const EDGE_ROWS: usize = 5;

fn cell(v: &Scalar) -> String {
    if v.is_missing() {
        "NaN".to_string()
    } else {
        v.to_string()
    }
}

/// Rows to show: everything, or the head and tail around an ellipsis row.
fn visible_rows(n: usize) -> (Vec<usize>, bool) {
    if n <= MAX_ROWS {
        ((0..n).collect(), false)
    } else {
        let mut rows: Vec<usize> = (0..EDGE_ROWS).collect();
        rows.extend(n - EDGE_ROWS..n);
        (rows, true)
    }
}

pub fn render_frame(df: &DataFrame) -> String {
    if df.columns.is_empty() {
        return format!(
            "Empty DataFrame\nColumns: []\nIndex: [{}]",
            (0..df.n_rows())
                .map(|i| df.index.label(i).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if df.n_rows() == 0 {
        return format!(
            "Empty DataFrame\nColumns: [{}]\nIndex: []",
            df.column_names().join(", ")
        );
    }

    let (rows, truncated) = visible_rows(df.n_rows());
    let mut grid: Vec<Vec<String>> = Vec::with_capacity(df.n_cols() + 1);

    let mut labels = vec![String::new()];
    labels.extend(rows.iter().map(|&r| df.index.label(r).to_string()));
    grid.push(labels);
    for col in &df.columns {
        let mut cells = vec![col.name.clone()];
        cells.extend(rows.iter().map(|&r| cell(&col.values[r])));
        grid.push(cells);
    }

    let widths: Vec<usize> = grid
        .iter()
        .map(|c| c.iter().map(|s| s.chars().count()).max().unwrap_or(0))
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 3);
    for line_idx in 0..=rows.len() {
        if truncated && line_idx == EDGE_ROWS + 1 {
            let dots: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    if i == 0 {
                        format!("{:<w$}", "..", w = *w)
                    } else {
                        format!("{:>w$}", "...", w = *w)
                    }
                })
                .collect();
            lines.push(dots.join("  "));
        }
        let parts: Vec<String> = grid
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (col, w))| {
                if i == 0 {
                    format!("{:<w$}", col[line_idx], w = *w)
                } else {
                    format!("{:>w$}", col[line_idx], w = *w)
                }
            })
            .collect();
        lines.push(parts.join("  ").trim_end().to_string());
    }
    if truncated {
        lines.push(String::new());
        lines.push(format!(
            "[{} rows x {} columns]",
            df.n_rows(),
            df.n_cols()
        ));
    }
    lines.join("\n")
}

pub fn render_series(s: &Series) -> String {
    let footer = match &s.name {
        Some(name) => format!("Name: {}, dtype: {}", name, s.dtype()),
        None => format!("dtype: {}", s.dtype()),
    };
    if s.is_empty() {
        return format!("Series([], {footer})");
    }
    let (rows, truncated) = visible_rows(s.len());
    let labels: Vec<String> = rows.iter().map(|&r| s.index.label(r).to_string()).collect();
    let values: Vec<String> = rows.iter().map(|&r| cell(&s.values[r])).collect();
    let lw = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let vw = values.iter().map(|v| v.chars().count()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    for (i, (label, value)) in labels.iter().zip(&values).enumerate() {
        if truncated && i == EDGE_ROWS {
            lines.push("..".to_string());
        }
        lines.push(format!("{label:<lw$}    {value:>vw$}"));
    }
    if truncated {
        lines.push(format!("Length: {}, {footer}", s.len()));
    } else {
        lines.push(footer);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_frame_aligns_columns() {
        let df = DataFrame::from_columns(vec![
            ("price", vec![Scalar::Int(10), Scalar::Int(200)]),
            ("sym", vec![Scalar::from("A"), Scalar::Null]),
        ])
        .unwrap();
        let text = render_frame(&df);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "   price  sym");
        assert_eq!(lines[1], "0     10    A");
        assert_eq!(lines[2], "1    200  NaN");
    }

    #[test]
    fn test_render_series_footer() {
        let s = Series::new(Some("qty".into()), vec![Scalar::Int(1), Scalar::Int(2)]);
        let text = render_series(&s);
        assert!(text.ends_with("Name: qty, dtype: int64"));
        assert!(text.starts_with("0    1"));
    }

    #[test]
    fn test_long_frame_is_truncated() {
        let values = (0..100).map(Scalar::Int).collect();
        let df = DataFrame::from_columns(vec![("n", values)]).unwrap();
        let text = render_frame(&df);
        assert!(text.contains("[100 rows x 1 columns]"));
        assert!(text.lines().count() < 20);
    }
}
