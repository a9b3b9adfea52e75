//! 表示用の整形
//!
//! ペインに表示する行を作ります。強調はインラインのマークアップトークン
//! （`[red]`、`[yellow]`、`[white]`）で表し、実際の色付けは描画側に任せます。

use regex::Regex;
use std::sync::OnceLock;
use tansaku_service::{AsmInstruction, Breakpoint, Register, StackFrame};

pub const MARKUP_RED: &str = "[red]";
pub const MARKUP_YELLOW: &str = "[yellow]";
pub const MARKUP_RESET: &str = "[white]";

/// レジスタペインに表示するレジスタの数
const REGISTER_LINES: usize = 17;

/// 行全体を強調する
pub fn highlight(line: &str) -> String {
    format!("{}{}{}", MARKUP_RED, line, MARKUP_RESET)
}

/// マークアップトークンを取り除く
pub fn strip_markup(line: &str) -> String {
    static MARKUP: OnceLock<Option<Regex>> = OnceLock::new();
    match MARKUP.get_or_init(|| Regex::new(r"\[(red|yellow|white)\]").ok()) {
        Some(re) => re.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

/// メモリ表示の単位サイズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSize {
    /// `b`: 1バイト
    Byte = 1,
    /// `h`: 2バイト
    Half = 2,
    /// `w`: 4バイト
    Word = 4,
    /// `g`: 8バイト
    Giant = 8,
}

impl UnitSize {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            'b' => Some(UnitSize::Byte),
            'h' => Some(UnitSize::Half),
            'w' => Some(UnitSize::Word),
            'g' => Some(UnitSize::Giant),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        self as usize
    }

    /// 1行に表示する単位数
    pub fn per_line(self) -> usize {
        match self {
            UnitSize::Byte => 8,
            UnitSize::Half => 4,
            UnitSize::Word => 4,
            UnitSize::Giant => 2,
        }
    }
}

/// メモリ表示の基数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    /// `x`
    Hex,
    /// `d`
    Decimal,
}

impl Radix {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            'x' => Some(Radix::Hex),
            'd' => Some(Radix::Decimal),
            _ => None,
        }
    }
}

/// `x` コマンドの表示形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamineFormat {
    pub unit: UnitSize,
    pub radix: Radix,
}

impl Default for ExamineFormat {
    fn default() -> Self {
        Self {
            unit: UnitSize::Giant,
            radix: Radix::Hex,
        }
    }
}

impl ExamineFormat {
    /// `gx` のようなモードフラグを解釈する
    ///
    /// 各文字が単位サイズ（`b`/`h`/`w`/`g`）か基数（`x`/`d`）を指定します。
    /// 指定のない項目は8バイト・16進数です。不明な文字があれば `None`。
    pub fn parse(flags: &str) -> Option<Self> {
        if flags.is_empty() {
            return None;
        }
        let mut format = Self::default();
        for flag in flags.chars() {
            if let Some(unit) = UnitSize::from_flag(flag) {
                format.unit = unit;
            } else if let Some(radix) = Radix::from_flag(flag) {
                format.radix = radix;
            } else {
                return None;
            }
        }
        Some(format)
    }
}

/// メモリを整形する
///
/// 各行は開始アドレスと、`per_line` 個の単位値です。単位値はリトルエンディアンで
/// 解釈するため、16進数ではバイトの並びが逆順で表示されます。
/// 単位に満たない末尾のバイトは表示しません。
pub fn format_memory(mem: &[u8], start: u64, format: ExamineFormat) -> Vec<String> {
    let unit = format.unit.bytes();
    let line_bytes = unit * format.unit.per_line();

    mem.chunks(line_bytes)
        .enumerate()
        .map(|(i, line)| {
            let address = start + (i * line_bytes) as u64;
            let units: Vec<String> = line
                .chunks_exact(unit)
                .map(|bytes| format_unit(bytes, format.radix))
                .collect();
            format!("0x{:x}    {}", address, units.join(" "))
        })
        .collect()
}

fn format_unit(bytes: &[u8], radix: Radix) -> String {
    match radix {
        Radix::Hex => {
            let digits: String = bytes.iter().rev().map(|b| format!("{:02x}", b)).collect();
            format!("0x{}", digits)
        }
        Radix::Decimal => {
            let value = bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            value.to_string()
        }
    }
}

/// 監視対象の値を整形する（上位バイトから）
pub fn format_value(mem: &[u8]) -> String {
    format_unit(mem, Radix::Hex)
}

/// 逆アセンブル結果を整形する
///
/// 関数が変わるたびに見出し行を入れ、ブレークポイントのある命令に `#` を付け、
/// PCの行を強調します。
pub fn format_disassembly(asms: &[AsmInstruction], pc: u64, max_lines: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut previous_function: Option<&str> = None;

    for asm in asms.iter().take(max_lines) {
        let function = asm.loc.function.as_str();
        if previous_function != Some(function) {
            lines.push(format!("{}; Function {} {}", MARKUP_YELLOW, function, MARKUP_RESET));
            previous_function = Some(function);
        }

        let marker = if asm.breakpoint { '#' } else { ' ' };
        let line = format!("0x{:x}    {}    {}", asm.loc.pc, marker, asm.text);
        if asm.loc.pc == pc {
            lines.push(highlight(&line));
        } else {
            lines.push(line);
        }
    }

    lines
}

/// レジスタを整形する
///
/// `previous` はペインの前回の表示内容で、値が変わった行を強調します。
pub fn format_registers(regs: &[Register], previous: &[String]) -> Vec<String> {
    regs.iter()
        .take(REGISTER_LINES)
        .enumerate()
        .map(|(i, reg)| {
            let line = format!("{:<3}     {}", reg.name, reg.value);
            match previous.get(i) {
                Some(old) if strip_markup(old) != line => highlight(&line),
                _ => line,
            }
        })
        .collect()
}

pub fn format_stacktrace(frames: &[StackFrame]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| format!("{}:{}", frame.function, frame.line))
        .collect()
}

/// ブレークポイント一覧を整形する（内部ブレークポイントは除く）
pub fn format_breakpoints(breakpoints: &[Breakpoint]) -> Vec<String> {
    breakpoints
        .iter()
        .filter(|bp| bp.id >= 0)
        .map(|bp| {
            let mut line = format!("{:02} | {}:{}", bp.id, bp.function_name, bp.line);
            if !bp.name.is_empty() {
                line.push_str(&format!(" ({})", bp.name));
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tansaku_service::Location;

    fn sequential(len: u8) -> Vec<u8> {
        (0..len).collect()
    }

    #[test]
    fn test_giant_hex_two_lines_for_32_bytes() {
        let lines = format_memory(&sequential(32), 0x7ffee000, ExamineFormat::default());
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "0x7ffee000    0x0706050403020100 0x0f0e0d0c0b0a0908"
        );
        assert_eq!(
            lines[1],
            "0x7ffee010    0x1716151413121110 0x1f1e1d1c1b1a1918"
        );
        for line in &lines {
            let groups: Vec<&str> = line.split_whitespace().skip(1).collect();
            assert_eq!(groups.len(), 2);
            assert!(groups.iter().all(|g| g.len() == 2 + 16));
        }
    }

    #[test]
    fn test_byte_and_word_units() {
        let byte = ExamineFormat::parse("bx").unwrap();
        let lines = format_memory(&sequential(16), 0x1000, byte);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "0x1000    0x00 0x01 0x02 0x03 0x04 0x05 0x06 0x07"
        );

        let word = ExamineFormat::parse("wx").unwrap();
        let lines = format_memory(&sequential(16), 0x1000, word);
        assert_eq!(lines, vec!["0x1000    0x03020100 0x07060504 0x0b0a0908 0x0f0e0d0c"]);
    }

    #[test]
    fn test_decimal_radix() {
        let format = ExamineFormat::parse("hd").unwrap();
        let lines = format_memory(&[0x01, 0x01, 0xff, 0x00, 0, 0, 0, 0], 0x10, format);
        assert_eq!(lines, vec!["0x10    257 255 0 0"]);
    }

    #[test]
    fn test_parse_mode_flags() {
        assert_eq!(ExamineFormat::parse("gx"), Some(ExamineFormat::default()));
        assert_eq!(
            ExamineFormat::parse("d"),
            Some(ExamineFormat {
                unit: UnitSize::Giant,
                radix: Radix::Decimal
            })
        );
        assert_eq!(
            ExamineFormat::parse("b").map(|f| f.unit),
            Some(UnitSize::Byte)
        );
        assert_eq!(ExamineFormat::parse("zx"), None);
        assert_eq!(ExamineFormat::parse(""), None);
    }

    #[test]
    fn test_format_value_is_most_significant_first() {
        assert_eq!(format_value(&[0x78, 0x56, 0x34, 0x12]), "0x12345678");
        assert_eq!(format_value(&[0x00, 0x01]), "0x0100");
    }

    #[test]
    fn test_disassembly_headers_and_markers() {
        let asm = |pc: u64, function: &str, text: &str, breakpoint: bool| AsmInstruction {
            loc: Location {
                pc,
                function: function.to_string(),
                ..Default::default()
            },
            text: text.to_string(),
            breakpoint,
            at_pc: false,
        };
        let asms = vec![
            asm(0x401000, "main.main", "push rbp", true),
            asm(0x401001, "main.main", "mov rbp, rsp", false),
            asm(0x401004, "main.helper", "ret", false),
        ];
        let lines = format_disassembly(&asms, 0x401001, 17);
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "[yellow]; Function main.main [white]");
        assert_eq!(lines[1], "0x401000    #    push rbp");
        assert_eq!(lines[2], "[red]0x401001         mov rbp, rsp[white]");
        assert_eq!(lines[3], "[yellow]; Function main.helper [white]");

        assert_eq!(format_disassembly(&asms, 0, 1).len(), 2);
    }

    #[test]
    fn test_register_changes_are_highlighted() {
        let before = format_registers(&[Register::new("Rax", "0x1"), Register::new("Rbx", "0x2")], &[]);
        assert_eq!(before, vec!["Rax     0x1", "Rbx     0x2"]);

        let after = format_registers(
            &[Register::new("Rax", "0x1"), Register::new("Rbx", "0x3")],
            &before,
        );
        assert_eq!(after[0], "Rax     0x1");
        assert_eq!(after[1], "[red]Rbx     0x3[white]");

        // 強調済みの前回内容とも比較できる
        let again = format_registers(
            &[Register::new("Rax", "0x1"), Register::new("Rbx", "0x3")],
            &after,
        );
        assert_eq!(again[1], "Rbx     0x3");
    }

    #[test]
    fn test_breakpoints_hide_internal_ids() {
        let bps = vec![
            Breakpoint {
                id: -1,
                name: "unrecovered-panic".into(),
                ..Default::default()
            },
            Breakpoint {
                id: 1,
                name: "main".into(),
                function_name: "main.main".into(),
                line: 5,
                ..Default::default()
            },
        ];
        assert_eq!(format_breakpoints(&bps), vec!["01 | main.main:5 (main)"]);
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("[red]0x10  0x1[white]"), "0x10  0x1");
        assert_eq!(strip_markup("[yellow]; Function f [white]"), "; Function f ");
    }
}
