//! Low-level header line scanning.
//!
//! These primitives operate directly on byte slices and are shared by the
//! chunked trailer parser and the multipart part-header parser. The
//! request/status line itself is parsed with `httparse` in the header
//! decoders.
//!
//! Lines are CRLF-terminated; a bare LF is tolerated. A header value may be
//! folded over continuation lines starting with SP or HT.

use crate::protocol::ParseError;

/// Locates the end of a header block: the offset just past the empty line
/// terminating it. Returns `None` when the buffer does not yet contain a
/// complete block; no positions are consumed, so the caller can retry on the
/// same (grown) buffer.
pub fn find_header_block_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            let mut line = &buf[line_start..i];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                return Some(i + 1);
            }
            line_start = i + 1;
        }
        i += 1;
    }
    None
}

/// Parses `name: value` pairs from a complete header block (with or without
/// the terminating empty line). Continuation lines starting with SP/HT fold
/// into the previous value; the trailing CR of each line is stripped. A
/// field without a colon is a hard parse failure.
pub fn parse_header_lines(block: &[u8]) -> Result<Vec<(String, String)>, ParseError> {
    let mut fields: Vec<(String, String)> = Vec::new();

    for raw_line in block.split(|b| *b == b'\n') {
        let mut line = raw_line;
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        if line.is_empty() {
            break;
        }

        if line[0] == b' ' || line[0] == b'\t' {
            // folded continuation of the previous field
            let Some((_, value)) = fields.last_mut() else {
                return Err(ParseError::invalid_header("continuation line without a preceding field"));
            };
            let folded = std::str::from_utf8(line)
                .map_err(|_| ParseError::invalid_header("header line is not valid utf-8"))?;
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(folded.trim());
            continue;
        }

        let line = std::str::from_utf8(line)
            .map_err(|_| ParseError::invalid_header("header line is not valid utf-8"))?;
        let Some((name, value)) = line.split_once(':') else {
            return Err(ParseError::invalid_header(format!("header field without colon: {line}")));
        };

        fields.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(fields)
}

/// Splices folded continuation lines into their field value: the line break
/// before an SP/HT continuation is removed, leaving the continuation
/// whitespace as the separator. Returns `None` when the block contains no
/// folding, so the common path parses the original bytes in place.
pub fn unfold_header_block(block: &[u8]) -> Option<Vec<u8>> {
    let folded = block.windows(2).any(|w| w[0] == b'\n' && (w[1] == b' ' || w[1] == b'\t'));
    if !folded {
        return None;
    }

    let mut out = Vec::with_capacity(block.len());
    let mut i = 0;
    while i < block.len() {
        if block[i] == b'\r'
            && block.get(i + 1) == Some(&b'\n')
            && matches!(block.get(i + 2), Some(b' ' | b'\t'))
        {
            i += 2;
            continue;
        }
        if block[i] == b'\n' && matches!(block.get(i + 1), Some(b' ' | b'\t')) {
            i += 1;
            continue;
        }
        out.push(block[i]);
        i += 1;
    }
    Some(out)
}
