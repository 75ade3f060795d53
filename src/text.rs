//! Text-to-sequence encoding for the supported dataset layouts.
//!
//! A fixed symbol inventory maps characters to integer ids:
//! - id 0: padding, id 1: end-of-sequence
//! - punctuation and ASCII lowercase letters
//! - Korean jamo (initial/medial/final), for KSS
//!
//! Hangul syllables are decomposed arithmetically on the U+AC00 block, so no
//! external vocabulary file is needed. Unknown characters are skipped. All
//! functions are pure.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::config::DatasetKind;

/// Padding symbol id.
pub const PAD: u32 = 0;
/// End-of-sequence symbol id.
pub const EOS: u32 = 1;

const PUNCTUATION: &str = " !'(),-.:;?";

const HANGUL_BASE: u32 = 0xAC00;
const HANGUL_END: u32 = 0xD7A3;
const CHOSEONG_BASE: u32 = 0x1100; // 19 initial consonants
const JUNGSEONG_BASE: u32 = 0x1161; // 21 medial vowels
const JONGSEONG_BASE: u32 = 0x11A7; // 27 final consonants, offset by 1

fn symbols() -> &'static Vec<char> {
    static SYMBOLS: OnceLock<Vec<char>> = OnceLock::new();
    SYMBOLS.get_or_init(|| {
        let mut list = vec!['_', '~'];
        list.extend(PUNCTUATION.chars());
        list.extend('a'..='z');
        list.extend((0..19).filter_map(|i| char::from_u32(CHOSEONG_BASE + i)));
        list.extend((0..21).filter_map(|i| char::from_u32(JUNGSEONG_BASE + i)));
        list.extend((1..=27).filter_map(|i| char::from_u32(JONGSEONG_BASE + i)));
        list
    })
}

fn symbol_map() -> &'static HashMap<char, u32> {
    static MAP: OnceLock<HashMap<char, u32>> = OnceLock::new();
    MAP.get_or_init(|| {
        symbols()
            .iter()
            .enumerate()
            .map(|(id, &c)| (c, id as u32))
            .collect()
    })
}

/// Total number of symbols, the embedding vocabulary size.
pub fn vocab_size() -> usize {
    symbols().len()
}

/// Encode text into symbol ids for the given dataset kind.
///
/// The sequence always ends with [`EOS`] and never contains [`PAD`].
pub fn text_to_sequence(text: &str, kind: DatasetKind) -> Vec<u32> {
    match kind {
        DatasetKind::Kss => kss_to_sequence(text),
        DatasetKind::Blizzard => blizzard_to_sequence(text),
    }
}

/// KSS: decompose Hangul syllables into jamo, keep punctuation, skip the rest.
fn kss_to_sequence(text: &str) -> Vec<u32> {
    let map = symbol_map();
    let mut seq = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = c as u32;
        if (HANGUL_BASE..=HANGUL_END).contains(&code) {
            for jamo in decompose_hangul(code) {
                if let Some(&id) = map.get(&jamo) {
                    seq.push(id);
                }
            }
        } else if let Some(&id) = map.get(&c) {
            seq.push(id);
        }
    }
    seq.push(EOS);
    seq
}

/// Blizzard: lowercase, collapse runs of whitespace, map through the table.
fn blizzard_to_sequence(text: &str) -> Vec<u32> {
    let map = symbol_map();
    let mut seq = Vec::with_capacity(text.len());
    let mut last_was_space = true; // also strips leading whitespace
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                seq.push(map[&' ']);
                last_was_space = true;
            }
            continue;
        }
        last_was_space = false;
        for lower in c.to_lowercase() {
            if let Some(&id) = map.get(&lower) {
                seq.push(id);
            }
        }
    }
    while seq.last() == Some(&map[&' ']) {
        seq.pop();
    }
    seq.push(EOS);
    seq
}

/// Decompose a Hangul syllable code point into its jamo characters.
///
/// A syllable is `0xAC00 + (cho * 21 + jung) * 28 + jong`; `jong == 0` means
/// no final consonant.
fn decompose_hangul(code: u32) -> Vec<char> {
    let idx = code - HANGUL_BASE;
    let cho = idx / (21 * 28);
    let jung = (idx % (21 * 28)) / 28;
    let jong = idx % 28;

    let mut jamo = Vec::with_capacity(3);
    if let Some(c) = char::from_u32(CHOSEONG_BASE + cho) {
        jamo.push(c);
    }
    if let Some(c) = char::from_u32(JUNGSEONG_BASE + jung) {
        jamo.push(c);
    }
    if jong > 0 {
        if let Some(c) = char::from_u32(JONGSEONG_BASE + jong) {
            jamo.push(c);
        }
    }
    jamo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocab_covers_all_symbol_classes() {
        // 2 specials + 11 punctuation + 26 letters + 19 + 21 + 27 jamo.
        assert_eq!(vocab_size(), 2 + 11 + 26 + 19 + 21 + 27);
    }

    #[test]
    fn sequences_end_with_eos_and_avoid_pad() {
        for kind in [DatasetKind::Kss, DatasetKind::Blizzard] {
            let seq = text_to_sequence("hello world!", kind);
            assert_eq!(*seq.last().unwrap(), EOS);
            assert!(seq.iter().all(|&id| id != PAD));
        }
    }

    #[test]
    fn blizzard_lowercases_and_collapses_whitespace() {
        let a = text_to_sequence("Hello   WORLD", DatasetKind::Blizzard);
        let b = text_to_sequence("hello world", DatasetKind::Blizzard);
        assert_eq!(a, b);

        let c = text_to_sequence("  padded  ", DatasetKind::Blizzard);
        let d = text_to_sequence("padded", DatasetKind::Blizzard);
        assert_eq!(c, d);
    }

    #[test]
    fn hangul_decomposition() {
        // '한' = U+D55C = cho 18 (ㅎ), jung 0 (ㅏ), jong 4 (ㄴ).
        let jamo = decompose_hangul(0xD55C);
        assert_eq!(jamo.len(), 3);
        assert_eq!(jamo[0] as u32, CHOSEONG_BASE + 18);
        assert_eq!(jamo[1] as u32, JUNGSEONG_BASE + 0);
        assert_eq!(jamo[2] as u32, JONGSEONG_BASE + 4);

        // '가' = U+AC00 has no final consonant.
        let jamo = decompose_hangul(0xAC00);
        assert_eq!(jamo.len(), 2);
    }

    #[test]
    fn kss_encodes_hangul_text() {
        // Two syllables with finals -> 3 jamo each, plus '.', plus EOS.
        let seq = text_to_sequence("한글.", DatasetKind::Kss);
        assert_eq!(seq.len(), 3 + 3 + 1 + 1);
        assert_eq!(*seq.last().unwrap(), EOS);
    }

    #[test]
    fn unknown_characters_are_skipped() {
        let with_digits = text_to_sequence("a1b2c3", DatasetKind::Blizzard);
        let without = text_to_sequence("abc", DatasetKind::Blizzard);
        assert_eq!(with_digits, without);
    }
}
