//! CSV field quoting
//!
//! Fields are written bare unless quoted explicitly; quoted fields double any
//! inner quote so a reader gets the exact text back.

/// Wrap a field in double quotes, doubling inner quotes
pub fn quote_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Split one CSV line into fields, honouring quoted fields
///
/// Returns `None` if a quoted field is not terminated.
pub fn split_row(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                ',' => fields.push(std::mem::take(&mut field)),
                '"' if field.is_empty() => in_quotes = true,
                _ => field.push(c),
            }
        }
    }

    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}
