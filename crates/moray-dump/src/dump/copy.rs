//! COPY text-format row decoding.
//!
//! Each data line holds tab-separated fields. `\N` is the null marker, and
//! backslash escapes encode the characters that would otherwise collide
//! with the delimiter or the line break:
//! https://www.postgresql.org/docs/current/sql-copy.html#id-1.9.3.55.9.2

/// Field delimiter used by `pg_dump`.
pub const DELIMITER: u8 = b'\t';

/// Null marker used by `pg_dump`.
pub const NULL_MARKER: &[u8] = b"\\N";

/// Line that terminates a COPY data block.
pub const END_OF_DATA: &str = "\\.";

/// Split and decode one data line (without its trailing newline).
///
/// Fields are returned as raw bytes; fails with a description when the
/// field count differs from `ncols`.
pub fn decode_row(line: &[u8], ncols: usize) -> Result<Vec<Option<Vec<u8>>>, String> {
    let mut values = Vec::with_capacity(ncols);

    for field in line.split(|b| *b == DELIMITER) {
        if values.len() == ncols {
            return Err(format!("too many columns on COPY row (expected {})", ncols));
        }
        values.push(decode_field(field));
    }

    if values.len() != ncols {
        return Err(format!(
            "too few columns on COPY row (expected {}, got {})",
            ncols,
            values.len()
        ));
    }

    Ok(values)
}

/// Decode a single field; `None` for the null marker.
pub fn decode_field(field: &[u8]) -> Option<Vec<u8>> {
    if field == NULL_MARKER {
        return None;
    }
    if !field.contains(&b'\\') {
        return Some(field.to_vec());
    }

    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;

    while i < field.len() {
        let b = field[i];
        if b != b'\\' || i + 1 == field.len() {
            out.push(b);
            i += 1;
            continue;
        }

        let e = field[i + 1];
        i += 2;
        match e {
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'0'..=b'7' => {
                let mut value = u32::from(e - b'0');
                let mut digits = 1;
                while digits < 3 && i < field.len() && (b'0'..=b'7').contains(&field[i]) {
                    value = value * 8 + u32::from(field[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xff) as u8);
            }
            b'x' if i < field.len() && field[i].is_ascii_hexdigit() => {
                let mut value = hex_value(field[i]);
                i += 1;
                if i < field.len() && field[i].is_ascii_hexdigit() {
                    value = value * 16 + hex_value(field[i]);
                    i += 1;
                }
                out.push(value);
            }
            other => out.push(other),
        }
    }

    Some(out)
}

fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}
