use anyhow::Result;
use comfy_table::Table;

pub fn print_table(table: Table) -> Result<()> {
    println!("{table}");
    Ok(())
}

/// First `max_chars` characters of `text` on one line.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let clipped: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{clipped}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_text() {
        assert_eq!(preview_text("short\ntext", 20), "short text");
        assert_eq!(preview_text("abcdefghij", 8), "abcde...");
    }
}
