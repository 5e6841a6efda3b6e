use crate::errors::{ErrorKind, KvError, KvResult};

/// Parses a byte size such as `"4096"`, `"64k"`, `"100m"` or `"2g"`.
///
/// Suffixes are case-insensitive binary multiples and may be followed by an
/// optional `b` (`"100mb"`). Surrounding whitespace is ignored.
pub fn parse_memory_size(value: &str) -> KvResult<u64> {
    let text = value.trim().to_ascii_lowercase();
    let text = text.strip_suffix('b').unwrap_or(&text);
    if text.is_empty() {
        return Err(invalid(value, "memory size"));
    }

    let (digits, multiplier) = match text.as_bytes()[text.len() - 1] {
        b'k' => (&text[..text.len() - 1], 1u64 << 10),
        b'm' => (&text[..text.len() - 1], 1u64 << 20),
        b'g' => (&text[..text.len() - 1], 1u64 << 30),
        b't' => (&text[..text.len() - 1], 1u64 << 40),
        _ => (text, 1u64),
    };

    let amount = digits
        .trim()
        .parse::<u64>()
        .map_err(|_| invalid(value, "memory size"))?;
    amount
        .checked_mul(multiplier)
        .ok_or_else(|| invalid(value, "memory size"))
}

/// Parses a boolean flag: `1/0`, `true/false`, `on/off`, `yes/no`.
pub fn parse_bool(value: &str) -> KvResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(invalid(value, "boolean")),
    }
}

/// Parses a decimal number stored as text, the representation used by
/// `incr`/`decr`.
pub fn parse_number(bytes: &[u8]) -> KvResult<f64> {
    let text = String::from_utf8_lossy(bytes);
    text.trim().parse::<f64>().map_err(|_| {
        log::error!("Value '{}' is not a number", text);
        KvError::new(
            &format!("Value '{}' is not a number", text),
            ErrorKind::InvalidDataType,
        )
    })
}

/// Formats a number so that integral values round-trip without a fraction.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn invalid(value: &str, what: &str) -> KvError {
    KvError::new(
        &format!("'{}' is not a valid {}", value, what),
        ErrorKind::InvalidConfiguration,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_size_plain_and_suffixed() {
        assert_eq!(parse_memory_size("4096").unwrap(), 4096);
        assert_eq!(parse_memory_size("64k").unwrap(), 64 * 1024);
        assert_eq!(parse_memory_size("100m").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_memory_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_memory_size(" 2g ").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_size("100mb").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_memory_size("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_memory_size_rejects_garbage() {
        for bad in ["", "m", "abc", "-1", "12q", "99999999999999999999t"] {
            let err = parse_memory_size(bad).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InvalidConfiguration, "{}", bad);
        }
    }

    #[test]
    fn test_parse_bool() {
        for yes in ["1", "true", "ON", "yes"] {
            assert!(parse_bool(yes).unwrap());
        }
        for no in ["0", "false", "off", "No"] {
            assert!(!parse_bool(no).unwrap());
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_parse_and_format_number() {
        assert_eq!(parse_number(b"42").unwrap(), 42.0);
        assert_eq!(parse_number(b" -1.5 ").unwrap(), -1.5);
        assert_eq!(
            parse_number(b"D42").unwrap_err().kind(),
            &ErrorKind::InvalidDataType
        );
        assert_eq!(
            parse_number(&[0xFF, 0x31]).unwrap_err().kind(),
            &ErrorKind::InvalidDataType
        );
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-7.0), "-7");
        assert_eq!(format_number(2.5), "2.5");
    }
}
