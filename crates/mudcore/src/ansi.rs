//! ANSI 控制序列處理
//!
//! 觸發器比對的是去除顏色碼後的純文字；送往畫面的文字則保留原樣。

/// 移除 ANSI 轉義序列與不可見控制字元
pub fn strip_ansi(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if c >= ' ' || c == '\t' {
                result.push(c);
            }
            continue;
        }

        match chars.peek() {
            // CSI：以 0x40-0x7E 結束
            Some('[') => {
                chars.next();
                for ch in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&ch) {
                        break;
                    }
                }
            }
            // OSC：以 BEL 或 ESC \ 結束
            Some(']') => {
                chars.next();
                while let Some(ch) = chars.next() {
                    if ch == '\x07' {
                        break;
                    }
                    if ch == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            // 字集指定
            Some('(') | Some(')') => {
                chars.next();
                chars.next();
            }
            _ => {}
        }
    }

    result
}
