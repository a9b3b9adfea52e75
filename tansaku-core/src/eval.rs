//! アドレス式評価エンジン
//!
//! `$rsp+0x10` のようなレジスタ参照と16進数リテラルを含む式を評価します。
//! レジスタ値は評価のたびに渡されるスナップショットから取得し、キャッシュしません
//! （ステップ実行のたびに変わるため）。

use tansaku_service::types::find_register;
use tansaku_service::Register;
use thiserror::Error;

/// 式評価のエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown register '${0}'")]
    UnknownRegister(String),
    #[error("invalid literal '{0}'")]
    InvalidLiteral(String),
    #[error("invalid expression '{expr}': {reason}")]
    Syntax { expr: String, reason: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{0} is not a valid address")]
    NotAnAddress(i128),
    #[error("arithmetic overflow in '{0}'")]
    Overflow(String),
}

/// アドレス式評価器
pub struct AddressEvaluator<'a> {
    regs: &'a [Register],
}

impl<'a> AddressEvaluator<'a> {
    /// レジスタのスナップショットから評価器を作成する
    pub fn new(regs: &'a [Register]) -> Self {
        Self { regs }
    }

    /// 式を評価してアドレスを返す
    pub fn evaluate(&self, expr: &str) -> Result<u64, EvalError> {
        let arithmetic = self.substitute(expr)?;
        let value = Arithmetic::new(&arithmetic).evaluate()?;
        u64::try_from(value).map_err(|_| EvalError::NotAnAddress(value))
    }

    /// 式を評価して `0x` 付きの16進数文字列を返す
    pub fn evaluate_address(&self, expr: &str) -> Result<String, EvalError> {
        self.evaluate(expr).map(format_address)
    }

    /// レジスタ参照と16進数リテラルを10進数に置き換える
    ///
    /// 式全体を小文字にしてから左から走査します。`$` に続く英数字をレジスタ名、
    /// 語の先頭にある `0x` に続く英数字を16進数として扱い、それ以外の文字は
    /// そのまま残します（`10x10` の `0x` は置き換えない）。
    pub fn substitute(&self, expr: &str) -> Result<String, EvalError> {
        let lowered = expr.to_ascii_lowercase();
        let mut rest = lowered.as_str();
        let mut out = String::with_capacity(rest.len());
        let mut prev: Option<char> = None;

        while let Some(c) = rest.chars().next() {
            let at_boundary = !prev.is_some_and(|p| p.is_ascii_alphanumeric());
            if c == '$' {
                let (name, tail) = split_alnum(&rest[1..]);
                let reg = find_register(self.regs, name)
                    .ok_or_else(|| EvalError::UnknownRegister(name.to_string()))?;
                let value = reg
                    .as_u64()
                    .map_err(|_| EvalError::InvalidLiteral(reg.value.clone()))?;
                out.push_str(&value.to_string());
                rest = tail;
                prev = name.chars().last();
            } else if at_boundary && rest.starts_with("0x") {
                let (digits, tail) = split_alnum(&rest[2..]);
                let value = u64::from_str_radix(digits, 16)
                    .map_err(|_| EvalError::InvalidLiteral(format!("0x{}", digits)))?;
                out.push_str(&value.to_string());
                rest = tail;
                prev = Some('x');
            } else {
                out.push(c);
                rest = &rest[c.len_utf8()..];
                prev = Some(c);
            }
        }

        Ok(out)
    }
}

/// アドレスを `0x` 付きの16進数で表す
pub fn format_address(addr: u64) -> String {
    format!("0x{:x}", addr)
}

/// 先頭から連続する英数字とその残りに分割する
fn split_alnum(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(s.len());
    s.split_at(end)
}

/// 四則演算と括弧だけを扱う再帰下降パーサー
///
/// 64ビットの値を丸めずに扱えるよう `i128` で計算し、除算は負の無限大方向に
/// 切り捨てます。
///
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := unary (('*' | '/') unary)*
/// unary  := ('-' | '+') unary | primary
/// primary:= number | '(' expr ')'
/// ```
struct Arithmetic<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Arithmetic<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn evaluate(mut self) -> Result<i128, EvalError> {
        let value = self.expr()?;
        self.skip_whitespace();
        if self.pos < self.bytes.len() {
            return Err(self.error(format!("unexpected '{}'", self.bytes[self.pos] as char)));
        }
        Ok(value)
    }

    fn error(&self, reason: String) -> EvalError {
        EvalError::Syntax {
            expr: self.src.to_string(),
            reason,
        }
    }

    fn overflow(&self) -> EvalError {
        EvalError::Overflow(self.src.to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.bytes.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<i128, EvalError> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            let result = if op == b'+' {
                value.checked_add(rhs)
            } else {
                value.checked_sub(rhs)
            };
            value = result.ok_or_else(|| self.overflow())?;
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<i128, EvalError> {
        let mut value = self.unary()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = if op == b'*' {
                value.checked_mul(rhs).ok_or_else(|| self.overflow())?
            } else {
                self.floor_div(value, rhs)?
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<i128, EvalError> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                let value = self.unary()?;
                value.checked_neg().ok_or_else(|| self.overflow())
            }
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<i128, EvalError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(self.error("missing closing parenthesis".to_string()));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) => Err(self.error(format!("unexpected '{}'", c as char))),
            None => Err(self.error("unexpected end of expression".to_string())),
        }
    }

    fn number(&mut self) -> Result<i128, EvalError> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let literal = &self.src[start..self.pos];
        literal
            .parse::<i128>()
            .map_err(|_| EvalError::InvalidLiteral(literal.to_string()))
    }

    /// 負の無限大方向に切り捨てる除算
    fn floor_div(&self, lhs: i128, rhs: i128) -> Result<i128, EvalError> {
        if rhs == 0 {
            return Err(EvalError::DivisionByZero);
        }
        let quotient = lhs.checked_div(rhs).ok_or_else(|| self.overflow())?;
        if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
            Ok(quotient - 1)
        } else {
            Ok(quotient)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> Vec<Register> {
        vec![
            Register::new("Rip", "0x401000"),
            Register::new("Rsp", "0x7ffee00"),
            Register::new("Rbp", "0x7ffee40"),
        ]
    }

    #[test]
    fn test_register_plus_hex() {
        let regs = regs();
        let eval = AddressEvaluator::new(&regs);
        assert_eq!(eval.evaluate_address("$rsp+0x10").unwrap(), "0x7ffee10");
        assert_eq!(eval.evaluate("$RSP + 0X10").unwrap(), 0x7ffee10);
    }

    #[test]
    fn test_arithmetic_matches_manual_computation() {
        let regs = regs();
        let eval = AddressEvaluator::new(&regs);
        assert_eq!(
            eval.evaluate("($rbp-$rsp)*2+0x100").unwrap(),
            (0x7ffee40 - 0x7ffee00) * 2 + 0x100
        );
        assert_eq!(eval.evaluate("$rip+8*2").unwrap(), 0x401000 + 16);
        assert_eq!(eval.evaluate("0x1000/3").unwrap(), 0x1000 / 3);
        assert_eq!(eval.evaluate("-(-0x20)").unwrap(), 0x20);
    }

    #[test]
    fn test_substitute_passes_other_characters() {
        let regs = regs();
        let eval = AddressEvaluator::new(&regs);
        assert_eq!(eval.substitute("$rip + 0x10").unwrap(), "4198400 + 16");
        assert_eq!(eval.substitute("(12)").unwrap(), "(12)");
    }

    #[test]
    fn test_unknown_register_is_an_error() {
        let regs = regs();
        let eval = AddressEvaluator::new(&regs);
        assert_eq!(
            eval.evaluate("$zzz+0x10"),
            Err(EvalError::UnknownRegister("zzz".to_string()))
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let regs = regs();
        let eval = AddressEvaluator::new(&regs);
        assert!(matches!(eval.evaluate("0xzz"), Err(EvalError::InvalidLiteral(_))));
        assert!(matches!(eval.evaluate("0x10+"), Err(EvalError::Syntax { .. })));
        assert!(matches!(eval.evaluate("(0x10"), Err(EvalError::Syntax { .. })));
        assert!(matches!(eval.evaluate("0x10 0x20"), Err(EvalError::Syntax { .. })));
        assert_eq!(eval.evaluate("0x10/0"), Err(EvalError::DivisionByZero));
        assert!(matches!(eval.evaluate("0x10-0x20"), Err(EvalError::NotAnAddress(_))));
    }

    #[test]
    fn test_result_is_floored() {
        let eval = AddressEvaluator::new(&[]);
        assert_eq!(eval.evaluate("7/2").unwrap(), 3);
        assert_eq!(eval.evaluate("(0-7)/2+5").unwrap(), 1);
        assert_eq!(eval.evaluate("0x10/(0-3)+0x10").unwrap(), 10);
    }

    #[test]
    fn test_full_width_addresses_are_exact() {
        let regs = vec![Register::new("Rsp", "0xffff888012345670")];
        let eval = AddressEvaluator::new(&regs);
        assert_eq!(
            eval.evaluate_address("0xffff888012345679").unwrap(),
            "0xffff888012345679"
        );
        assert_eq!(
            eval.evaluate_address("0xffff888012345679+1").unwrap(),
            "0xffff88801234567a"
        );
        assert_eq!(eval.evaluate("$rsp+0x8").unwrap(), 0xffff888012345678);
        assert_eq!(eval.evaluate("0xffffffffffffffff").unwrap(), u64::MAX);
        assert_eq!(
            eval.evaluate("0xffffffffffffffff+1"),
            Err(EvalError::NotAnAddress(1 << 64))
        );
    }

    #[test]
    fn test_hex_prefix_only_at_token_start() {
        let regs = regs();
        let eval = AddressEvaluator::new(&regs);
        assert_eq!(eval.substitute("10x10").unwrap(), "10x10");
        assert!(matches!(eval.evaluate("10x10"), Err(EvalError::Syntax { .. })));
        assert_eq!(eval.substitute("(0x10)*2").unwrap(), "(16)*2");
        assert_eq!(eval.substitute("2*0x10").unwrap(), "2*16");
    }

    #[test]
    fn test_overflow_is_an_error() {
        let eval = AddressEvaluator::new(&[]);
        let huge = "0xffffffffffffffff*0xffffffffffffffff*0xffffffffffffffff";
        assert!(matches!(eval.evaluate(huge), Err(EvalError::Overflow(_))));
        assert!(matches!(
            eval.evaluate("99999999999999999999999999999999999999999"),
            Err(EvalError::InvalidLiteral(_))
        ));
    }
}
