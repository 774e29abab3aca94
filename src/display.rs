use fimint::{ComparisonRow, FileRecord, MetaValue};

const LABEL_WIDTH: usize = 30;
const BAR_WIDTH: usize = 40;

/// Shorten a file name for chart labels, marking the cut with `…`.
pub fn truncate_label(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let kept: String = name.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", kept)
}

pub fn print_record(record: &FileRecord) {
    println!("📄 {}", record.name);
    println!("   🔑 SHA-256: {}", record.hash);
    if record.metadata.is_empty() {
        println!("   (no metadata)");
        return;
    }
    let width = record.metadata.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in &record.metadata {
        let cell = match value {
            MetaValue::Missing => "N/A".to_string(),
            other => other.to_cell(),
        };
        println!("   {:<width$}  {}", key, cell, width = width);
    }
}

pub fn print_comparisons(rows: &[ComparisonRow]) {
    if rows.is_empty() {
        println!("No file pairs to compare.");
        return;
    }
    let w1 = column_width(rows.iter().map(|r| r.file1.as_str()), "File1");
    let w2 = column_width(rows.iter().map(|r| r.file2.as_str()), "File2");

    println!(
        "{:<w1$}  {:<w2$}  {:<14}  {:>10}  {:>8}  Identical Hash",
        "File1",
        "File2",
        "System",
        "Similarity",
        "Matches",
        w1 = w1,
        w2 = w2
    );
    for row in rows {
        println!(
            "{:<w1$}  {:<w2$}  {:<14}  {:>10}  {:>8}  {}",
            row.file1,
            row.file2,
            row.system.id(),
            row.similarity,
            row.matching_keys.len(),
            if row.identical_hash { "yes" } else { "no" },
            w1 = w1,
            w2 = w2
        );
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>, header: &str) -> usize {
    values
        .map(|v| v.chars().count())
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or(0)
}

/// Horizontal bar per file pair and system, scaled to the highest score.
pub fn print_chart(rows: &[ComparisonRow]) {
    let max = rows.iter().map(|r| r.similarity).max().unwrap_or(0);
    if max == 0 {
        println!("📊 No shared metadata between any pair.");
        return;
    }

    println!("📊 Similarity by file pair:");
    for row in rows {
        let label = format!(
            "{} ↔ {}",
            truncate_label(&row.file1, LABEL_WIDTH),
            truncate_label(&row.file2, LABEL_WIDTH)
        );
        let len = (row.similarity as usize * BAR_WIDTH).div_ceil(max as usize);
        println!(
            "   {:<63} {:<14} {} {}",
            label,
            row.system.id(),
            "█".repeat(len),
            row.similarity
        );
    }
}
