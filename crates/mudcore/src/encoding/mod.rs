//! 文字編解碼模組
//!
//! 伺服器送來的位元組依設定以 UTF-8 或 Big5（台灣 MUD 常用）解碼

use encoding_rs::BIG5;
use serde::{Deserialize, Serialize};

/// 伺服器使用的文字編碼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Big5,
}

impl TextEncoding {
    /// 解碼一行位元組（無效字元以 U+FFFD 取代）
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Big5 => decode_big5(bytes),
        }
    }

    /// 編碼要送出的文字
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Big5 => encode_big5(text),
        }
    }
}

/// 將 Big5 編碼的位元組轉換為 UTF-8 字串
///
/// # Example
/// ```
/// use mudcore::encoding::decode_big5;
///
/// let big5_bytes = [0xb4, 0xfa, 0xa6, 0xb4]; // "測試" in Big5
/// let text = decode_big5(&big5_bytes);
/// assert!(!text.is_empty());
/// ```
pub fn decode_big5(bytes: &[u8]) -> String {
    let (decoded, _, _) = BIG5.decode(bytes);
    decoded.into_owned()
}

/// 將 UTF-8 字串轉換為 Big5 編碼的位元組（無法編碼的字元會被替換）
pub fn encode_big5(text: &str) -> Vec<u8> {
    let (encoded, _, _) = BIG5.encode(text);
    encoded.into_owned()
}
