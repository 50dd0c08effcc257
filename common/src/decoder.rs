//! エンジン出力ストリームのデコーダー
//!
//! 任意の位置で区切られたバイトチャンクを、完結した行の列に変換する。
//! エンジンはレガシー文字コード（既定は Shift_JIS）で出力するため、
//! マルチバイト文字がチャンク境界で割れることがある。未完成のバイト列は
//! `encoding_rs::Decoder` がバイト単位で保持し、改行で終わらない末尾の
//! テキストはキャリーオーバーとして次回に持ち越す。

use crate::error::{Error, Result};
use encoding_rs::{CoderResult, Decoder, Encoding};

/// WHATWGのラベルから文字コードを引く（前後の空白は無視）
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| Error::Encoding(label.to_string()))
}

/// 1ストリーム分のデコード状態（stdout と stderr で共有しないこと）
pub struct StreamDecoder {
    decoder: Decoder,
    carry: String,
}

impl StreamDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
            carry: String::new(),
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.decoder.encoding()
    }

    /// 未完成の行（次のチャンクを待っているテキスト）
    pub fn carry_over(&self) -> &str {
        &self.carry
    }

    /// チャンクを投入し、完結した行を返す
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk, false);
        self.split_lines(&text)
    }

    /// ストリーム終端。保留中のバイトと末尾の未完成行を吐き出し、状態をリセットする
    pub fn finish(&mut self) -> Vec<String> {
        let text = self.decode(&[], true);
        let mut lines = self.split_lines(&text);

        let rest = std::mem::take(&mut self.carry);
        let rest = rest.trim_end_matches('\r');
        if !rest.is_empty() {
            lines.push(rest.to_string());
        }

        self.decoder = self.decoder.encoding().new_decoder_without_bom_handling();
        lines
    }

    fn decode(&mut self, bytes: &[u8], last: bool) -> String {
        let mut out = String::with_capacity(self.capacity_for(bytes.len()));
        let mut src = bytes;

        loop {
            let (result, read, had_errors) = self.decoder.decode_to_string(src, &mut out, last);
            if had_errors {
                // 不正なバイト列は置換文字になる。ストリームは止めない
                tracing::debug!("不正なバイト列を置換しました ({})", self.decoder.encoding().name());
            }
            src = &src[read..];

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => {
                    let additional = self.capacity_for(src.len());
                    out.reserve(additional);
                }
            }
        }

        out
    }

    fn capacity_for(&self, byte_length: usize) -> usize {
        self.decoder
            .max_utf8_buffer_length(byte_length)
            .unwrap_or(byte_length * 3 + 16)
    }

    fn split_lines(&mut self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut joined = std::mem::take(&mut self.carry);
        joined.push_str(text);
        let normalized = joined.replace("\r\n", "\n");

        // 最後の要素は最終改行より後ろ（改行で終わっていれば空文字列）
        let mut lines: Vec<String> = normalized.split('\n').map(str::to_owned).collect();
        self.carry = lines.pop().unwrap_or_default();
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sjis(text: &str) -> Vec<u8> {
        let (bytes, _, had_errors) = encoding_rs::SHIFT_JIS.encode(text);
        assert!(!had_errors);
        bytes.into_owned()
    }

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = StreamDecoder::new(encoding_rs::SHIFT_JIS);
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(decoder.feed(chunk));
        }
        lines.extend(decoder.finish());
        lines
    }

    #[test]
    fn test_complete_lines_are_emitted() {
        let mut decoder = StreamDecoder::new(encoding_rs::SHIFT_JIS);
        let lines = decoder.feed(b"first\nsecond\n");
        assert_eq!(lines, vec!["first", "second"]);
        assert_eq!(decoder.carry_over(), "");
    }

    #[test]
    fn test_incomplete_tail_is_carried_over() {
        let mut decoder = StreamDecoder::new(encoding_rs::SHIFT_JIS);
        assert_eq!(decoder.feed(b"abc\nde"), vec!["abc"]);
        assert_eq!(decoder.carry_over(), "de");
        assert_eq!(decoder.feed(b"f\n"), vec!["def"]);
        assert_eq!(decoder.carry_over(), "");
    }

    #[test]
    fn test_crlf_is_normalized_across_chunks() {
        let mut decoder = StreamDecoder::new(encoding_rs::SHIFT_JIS);
        assert!(decoder.feed(b"abc\r").is_empty());
        assert_eq!(decoder.feed(b"\ndef\r\n"), vec!["abc", "def"]);
    }

    #[test]
    fn test_multibyte_split_at_chunk_boundary() {
        let bytes = sjis("音声認識中…\n");
        // 「音」の1バイト目と2バイト目の間で切る
        let lines = decode_all(&[&bytes[..1], &bytes[1..]]);
        assert_eq!(lines, vec!["音声認識中…"]);
    }

    #[test]
    fn test_chunking_invariance_over_every_split_point() {
        let bytes = sjis("1.無音解析開始\r\n[PROGRESS]{\"stage\":\"seg\",\"index\":0}\n末尾");
        let expected = decode_all(&[&bytes]);
        assert_eq!(expected.len(), 3);

        for i in 0..=bytes.len() {
            assert_eq!(decode_all(&[&bytes[..i], &bytes[i..]]), expected, "split at {}", i);
            for j in i..=bytes.len() {
                assert_eq!(
                    decode_all(&[&bytes[..i], &bytes[i..j], &bytes[j..]]),
                    expected,
                    "split at {} and {}",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let bytes = sjis("話者A\n話者B\n");
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&chunks), vec!["話者A", "話者B"]);
    }

    #[test]
    fn test_malformed_bytes_are_replaced() {
        // 0x81 単独は Shift_JIS として不完全
        let lines = decode_all(&[b"ok\n\x81\n", b"next\n"]);
        assert_eq!(lines[0], "ok");
        assert!(lines[1].contains('\u{FFFD}'));
        assert_eq!(lines[2], "next");
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = StreamDecoder::new(encoding_rs::SHIFT_JIS);
        assert!(decoder.feed(b"no newline").is_empty());
        assert_eq!(decoder.finish(), vec!["no newline"]);
        assert_eq!(decoder.carry_over(), "");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_empty_lines_are_preserved() {
        assert_eq!(decode_all(&[b"a\n\nb\n"]), vec!["a", "", "b"]);
    }

    #[test]
    fn test_encoding_for_label() {
        assert_eq!(encoding_for_label("sjis").unwrap(), encoding_rs::SHIFT_JIS);
        assert_eq!(encoding_for_label(" utf-8 ").unwrap(), encoding_rs::UTF_8);
        let decoder = StreamDecoder::new(encoding_for_label("shift_jis").unwrap());
        assert_eq!(decoder.encoding(), encoding_rs::SHIFT_JIS);
        assert!(matches!(encoding_for_label("klingon"), Err(Error::Encoding(_))));
    }
}
