//! Minimal `multipart/form-data` reader: enough to pull one named file part.

use anyhow::{anyhow, Result};

/// Extract the `boundary` parameter from a multipart content type.
pub(crate) fn boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// Return the body of the part whose `Content-Disposition` name is `field`.
pub(crate) fn extract_part<'a>(body: &'a [u8], boundary: &str, field: &str) -> Result<&'a [u8]> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();
    let mut cursor =
        find(body, delimiter, 0).ok_or_else(|| anyhow!("multipart boundary not found"))?;

    loop {
        cursor += delimiter.len();
        if body[cursor..].starts_with(b"--") {
            break;
        }
        let head_start = skip_crlf(body, cursor);
        let head_end = find(body, b"\r\n\r\n", head_start)
            .ok_or_else(|| anyhow!("multipart part headers are truncated"))?;
        let data_start = head_end + 4;
        let next = find(body, delimiter, data_start)
            .ok_or_else(|| anyhow!("multipart closing boundary not found"))?;
        let mut data_end = next;
        if data_end >= data_start + 2 && &body[data_end - 2..data_end] == b"\r\n" {
            data_end -= 2;
        }

        let headers = String::from_utf8_lossy(&body[head_start..head_end]);
        if part_name(&headers).as_deref() == Some(field) {
            return Ok(&body[data_start..data_end]);
        }
        cursor = next;
    }
    Err(anyhow!("multipart body has no '{}' part", field))
}

fn part_name(headers: &str) -> Option<String> {
    let disposition = headers.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("content-disposition")
            .then(|| value.to_string())
    })?;
    disposition.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        (key.trim() == "name").then(|| value.trim().trim_matches('"').to_string())
    })
}

fn skip_crlf(body: &[u8], at: usize) -> usize {
    if body[at..].starts_with(b"\r\n") {
        at + 2
    } else {
        at
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
