//! パース関連のユーティリティ関数

use anyhow::Result;

/// アドレス文字列をu64にパース
///
/// プレフィックスから基数を判定します（`0x` は16進数、`0o`/`0` は8進数、`0b` は2進数、
/// それ以外は10進数）。プレフィックスのない16進数へのフォールバックは行いません。
/// `clear` コマンドがアドレスとシンボル名を区別するため、`abc` のような文字列は
/// エラーになる必要があります。
///
/// # Examples
/// ```
/// use tansaku_service::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 1234);
/// assert!(parse_address("main").is_err());
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();

    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (bin, 2)
    } else if let Some(oct) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (oct, 8)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() {
        return Err(anyhow::anyhow!("Invalid address '{}': no digits", s));
    }

    u64::from_str_radix(digits, radix)
        .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_hex() {
        assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
        assert_eq!(parse_address("0X1234").unwrap(), 0x1234);
        assert_eq!(parse_address("0xabcd").unwrap(), 0xabcd);
        assert_eq!(parse_address("0xABCD").unwrap(), 0xabcd);
    }

    #[test]
    fn test_parse_address_dec_and_octal() {
        assert_eq!(parse_address("1234").unwrap(), 1234);
        assert_eq!(parse_address("0").unwrap(), 0);
        assert_eq!(parse_address("010").unwrap(), 8);
        assert_eq!(parse_address("0b101").unwrap(), 5);
    }

    #[test]
    fn test_parse_address_invalid() {
        assert!(parse_address("xyz").is_err());
        assert!(parse_address("abc").is_err());
        assert!(parse_address("0xghij").is_err());
        assert!(parse_address("0x").is_err());
        assert!(parse_address("").is_err());
    }
}
