//! Formatted output helpers for CLI commands.

use pulse_image::registry::ImageSummary;

const HEADERS: [&str; 3] = ["IMAGE", "MODIFIED", "EXTRACTED"];

/// Renders images as a left-aligned table with a header row.
#[must_use]
pub fn image_table(images: &[ImageSummary]) -> String {
    let rows: Vec<[String; 3]> = images
        .iter()
        .map(|i| {
            [
                i.name.clone(),
                i.modified.clone(),
                yes_no(i.extracted).to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS.map(String::from), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 3], widths: &[usize; 3]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_store_prints_header_only() {
        assert_eq!(image_table(&[]), "IMAGE  MODIFIED  EXTRACTED\n");
    }

    #[test]
    fn columns_align_to_widest_cell() {
        let images = vec![
            ImageSummary {
                name: "alpine_3.20-oci".into(),
                modified: "2026-01-02T03:04:05+00:00".into(),
                extracted: true,
            },
            ImageSummary {
                name: "a-oci".into(),
                modified: "2026-01-02T03:04:05+00:00".into(),
                extracted: false,
            },
        ];
        let table = image_table(&images);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("alpine_3.20-oci  2026-"));
        assert!(lines[2].starts_with("a-oci            2026-"));
        assert!(lines[2].ends_with("no"));
    }
}
