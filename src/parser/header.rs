//! RFC 5322 header access: locating the header block, unfolding, and
//! extracting the Message-ID used as the deduplication key.

/// Extract the Message-ID of a raw message.
///
/// The header name is matched case-insensitively, the first occurrence
/// wins, and the value is trimmed. Returns `None` when the header is
/// missing or empty.
pub fn extract_message_id(raw: &[u8]) -> Option<String> {
    let text = decode_header_bytes(header_block(raw));
    let headers = unfold_headers(&text);
    get_header(&headers, "message-id").filter(|v| !v.is_empty())
}

/// Return the header block of a message: everything before the first blank line.
///
/// If the message has no blank line the whole input is treated as headers.
pub fn header_block(raw: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < raw.len() {
        let end = raw[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |p| start + p + 1);
        let line = &raw[start..end];
        if line == b"\n" || line == b"\r\n" || line == b"\r" {
            return &raw[..start];
        }
        start = end;
    }
    raw
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &bytes[3..]
    } else {
        bytes
    };

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, trimmed_value)` pairs in order of appearance.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                let cont = line.trim();
                if !cont.is_empty() {
                    if !last.1.is_empty() {
                        last.1.push(' ');
                    }
                    last.1.push_str(cont);
                }
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation are silently skipped
    }

    result
}

/// Get the first value for a header name (case-insensitive).
fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}
