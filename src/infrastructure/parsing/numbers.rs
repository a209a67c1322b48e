//! Normalizers for human-formatted counts, durations and keyword lists

/// Parse a count label such as `"1.2K subscribers"`, `"22 videos"` or `"1,234 views"`.
///
/// Only the first word is considered. A trailing `K`, `M` or `B` multiplies
/// the value. Empty or non-numeric text yields `None`.
pub fn normalize_count(text: &str) -> Option<u64> {
    let word = text.split_whitespace().next()?;
    let cleaned: String = word.chars().filter(|c| *c != ',').collect();

    let (digits, multiplier) = match cleaned.chars().last()? {
        'K' | 'k' => (&cleaned[..cleaned.len() - 1], 1_000_f64),
        'M' | 'm' => (&cleaned[..cleaned.len() - 1], 1_000_000_f64),
        'B' | 'b' => (&cleaned[..cleaned.len() - 1], 1_000_000_000_f64),
        _ => (cleaned.as_str(), 1_f64),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    let scaled = (value * multiplier).round();
    if !scaled.is_finite() || scaled < 0.0 || scaled > u64::MAX as f64 {
        return None;
    }
    Some(scaled as u64)
}

/// Parse a clock-style duration (`"1:02:15"`, `"4:05"`, `"59"`) into seconds
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0_u64, |total, part| {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value: u64 = part.parse().ok()?;
        total.checked_mul(60)?.checked_add(value)
    })
}

/// Split a keyword string on spaces, keeping double-quoted phrases together
pub fn split_quoted(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                if in_quotes && !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
