//! Output trimming that never splits a UTF-8 character

/// Largest char boundary at or below `at`
fn floor_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut i = at;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `at`
fn ceil_boundary(s: &str, at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    let mut i = at;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Keep at most `max` bytes, noting how much was dropped
pub fn cap_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let cut = floor_boundary(s, max);
    format!(
        "{}\n... [output truncated, {} more bytes]",
        &s[..cut],
        s.len() - cut
    )
}

/// Keep the first `head` and last `tail` bytes around a marker
pub fn head_tail(s: &str, head: usize, tail: usize) -> String {
    if s.len() <= head + tail {
        return s.to_string();
    }
    let head_end = floor_boundary(s, head);
    let tail_start = ceil_boundary(s, s.len() - tail);
    format!(
        "{}\n\n... [{} bytes omitted] ...\n\n{}",
        &s[..head_end],
        tail_start - head_end,
        &s[tail_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_short_untouched() {
        assert_eq!(cap_bytes("hello", 10), "hello");
    }

    #[test]
    fn test_cap_respects_char_boundary() {
        let s = "ééééé";
        let capped = cap_bytes(s, 3);
        assert!(capped.starts_with('é'));
        assert!(capped.contains("more bytes"));
    }

    #[test]
    fn test_head_tail() {
        let s: String = (0..100).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let trimmed = head_tail(&s, 10, 5);
        assert!(trimmed.starts_with(&s[..10]));
        assert!(trimmed.ends_with(&s[95..]));
        assert!(trimmed.contains("85 bytes omitted"));
    }

    #[test]
    fn test_head_tail_multibyte() {
        let s = "日本語".repeat(50);
        let trimmed = head_tail(&s, 7, 7);
        assert!(trimmed.contains("omitted"));
    }
}
