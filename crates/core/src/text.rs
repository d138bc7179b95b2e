use std::fs;
use std::io;
use std::path::Path;

use chardetng::EncodingDetector;

/// 從磁碟讀回的文字與解碼結果。 / Text read back from disk along with decode diagnostics.
#[derive(Debug, Clone)]
pub struct LoadedText {
    /// 行尾已正規化為 `\n` 的內容。 / Contents with line endings normalised to `\n`.
    pub text: String,
    /// 解碼時是否產生取代字元。 / Whether decoding introduced replacement characters.
    pub had_replacements: bool,
}

/// 讀取檔案並解碼為文字。 / Reads a file from disk and decodes it to text.
///
/// UTF-8 input (with or without BOM) is decoded strictly. Anything else
/// falls back to a `chardetng` guess decoded lossily, with
/// `had_replacements` flagging mojibake so the caller can warn the user.
pub fn load_file(path: &Path) -> io::Result<LoadedText> {
    let bytes = fs::read(path)?;
    Ok(decode_bytes(&bytes))
}

fn decode_bytes(bytes: &[u8]) -> LoadedText {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(body) {
        return LoadedText {
            had_replacements: text.contains('\u{FFFD}'),
            text: normalize_newlines(text),
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(body, true);
    let guess = detector.guess(None, true);
    let (decoded, _, had_errors) = guess.decode(body);
    LoadedText {
        text: normalize_newlines(&decoded),
        had_replacements: had_errors,
    }
}

/// 以暫存檔搭配 rename 將文字原子寫入。 / Writes text atomically via a temporary sibling file plus rename.
pub fn save_file(text: &str, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp_rustsketchpad");
    fs::write(&tmp_path, text.as_bytes())?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

/// 計算內容中的換行符號數量。 / Counts the number of line breaks in the text.
pub fn count_lines(text: &str) -> usize {
    text.bytes().filter(|&byte| byte == b'\n').count()
}

fn normalize_newlines(input: &str) -> String {
    // CRLF 與 CR 一律轉成 LF。 / Convert CRLF and CR sequences to LF.
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                result.push('\n');
            }
            _ => result.push(ch),
        }
    }
    result
}
