/// 注入式的使用者訊息輸出端，呼叫後即結束不回報失敗。 / Injected fire-and-forget sink for user-facing messages.
///
/// Modelled as a collaborator instead of a global logger so tests can
/// substitute a capture double and assert on emitted warnings.
pub trait StatusLog {
    fn log(&self, message: &str);
}

/// 將訊息寫到標準錯誤輸出的預設實作。 / Default implementation writing messages to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrLog;

impl StatusLog for StderrLog {
    fn log(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// 檢查掃描到的基底檔名是否合法。 / Vets base file names discovered during a folder scan.
pub trait NameValidator {
    fn is_sanitary(&self, base: &str) -> bool;
}

/// 沿用草稿慣例的嚴格檔名規則。 / Strict naming rules following the sketch convention.
///
/// A sanitary base name starts with an ASCII letter or underscore,
/// continues with ASCII letters, digits, `_`, `.` or `-`, and is at
/// most 63 bytes long.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictNameValidator;

impl NameValidator for StrictNameValidator {
    fn is_sanitary(&self, base: &str) -> bool {
        if base.is_empty() || base.len() > 63 {
            return false;
        }
        let mut chars = base.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
            _ => return false,
        }
        chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
    }
}
