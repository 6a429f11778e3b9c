/// Normalizes an Iranian mobile number to the `09xxxxxxxxx` form.
///
/// Accepts Persian and Arabic-Indic digits, separators, and the `+98` / `0098` / `98`
/// country prefixes. Returns `None` for anything that is not a mobile number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits = String::with_capacity(raw.len());
    for (i, c) in raw.trim().chars().enumerate() {
        match c {
            '0'..='9' => digits.push(c),
            '۰'..='۹' => digits.push(shift_digit(c, '۰')),
            '٠'..='٩' => digits.push(shift_digit(c, '٠')),
            ' ' | '-' | '(' | ')' | '.' => {}
            '+' if i == 0 => {}
            _ => return None,
        }
    }

    let national = match digits.len() {
        14 => digits.strip_prefix("0098"),
        12 => digits.strip_prefix("98"),
        11 => digits.strip_prefix('0'),
        10 => Some(digits.as_str()),
        _ => None,
    }?;

    if national.len() == 10 && national.starts_with('9') {
        Some(format!("0{national}"))
    } else {
        None
    }
}

/// Masks the middle of a phone number for logs: `0912***4567`.
pub fn mask_phone(phone: &str) -> String {
    if phone.len() < 8 || !phone.is_ascii() {
        return "***".to_string();
    }
    format!("{}***{}", &phone[..4], &phone[phone.len() - 4..])
}

fn shift_digit(c: char, zero: char) -> char {
    let offset = c as u32 - zero as u32;
    char::from_digit(offset, 10).unwrap_or('0')
}
