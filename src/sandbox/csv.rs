//! Quote-aware CSV splitting for dataset materialization.
//!
//! Rows split on newlines; within a data line a character scan tracks
//! quote state so commas inside double-quoted fields do not split the
//! field. Tokens are trimmed, surrounding quotes are consumed, and a
//! doubled quote inside a quoted field unescapes to one literal quote.

/// Parsed tabular text: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Parses CSV text into headers and rows. Blank lines are skipped.
pub fn parse_csv(text: &str) -> CsvTable {
    let mut lines = text.trim().lines();

    let headers = match lines.next() {
        Some(line) if !line.trim().is_empty() => split_line(line),
        _ => return CsvTable::default(),
    };

    let rows = lines
        .filter(|line| !line.trim().is_empty())
        .map(split_line)
        .collect();

    CsvTable { headers, rows }
}

fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field.
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_table() {
        let table = parse_csv("name,population\nTokyo,37\nDelhi,32\n");
        assert_eq!(table.headers, vec!["name", "population"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["Tokyo", "37"]);
    }

    #[test]
    fn test_quoted_comma_and_doubled_quotes() {
        let table = parse_csv("name,note\n\"Smith, John\",\"says \"\"hi\"\"\"\n");
        assert_eq!(table.headers, vec!["name", "note"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], "Smith, John");
        assert_eq!(table.rows[0][1], "says \"hi\"");
    }

    #[test]
    fn test_quoted_headers_are_stripped() {
        let table = parse_csv("\"first name\",\"last name\"\na,b\n");
        assert_eq!(table.headers, vec!["first name", "last name"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let table = parse_csv("x,y\n1,2\n\n3,4\n\n");
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("   \n  ").is_empty());
    }

    #[test]
    fn test_empty_fields_preserved() {
        let table = parse_csv("a,b,c\n1,,3\n");
        assert_eq!(table.rows[0], vec!["1", "", "3"]);
    }
}
