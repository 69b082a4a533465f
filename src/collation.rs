use std::cmp::Ordering;

const HANGUL_BASE: u32 = 0xAC00;
const HANGUL_LAST: u32 = 0xD7A3;
const VOWELS_TIMES_FINALS: u32 = 21 * 28;
const FINALS: u32 = 28;

/// Compatibility jamo for the 19 leading consonants, in syllable order.
const LEADING_JAMO: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ', 'ㅋ',
    'ㅌ', 'ㅍ', 'ㅎ',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Class {
    Whitespace,
    Punctuation,
    Digit,
    Hangul,
    Han,
    Latin,
    Other,
}

/// Primary collation element of a single character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Primary {
    class: Class,
    weight: u32,
}

fn primary(c: char) -> Primary {
    let cp = c as u32;

    if c.is_whitespace() {
        return Primary { class: Class::Whitespace, weight: cp };
    }
    if let Some(d) = c.to_digit(10) {
        return Primary { class: Class::Digit, weight: d };
    }
    if (HANGUL_BASE..=HANGUL_LAST).contains(&cp) {
        let index = cp - HANGUL_BASE;
        let lead = index / VOWELS_TIMES_FINALS;
        let vowel = (index % VOWELS_TIMES_FINALS) / FINALS;
        let tail = index % FINALS;
        // A bare leading consonant (vowel slot 0) sorts before any syllable
        // built on it, hence the +1 on the vowel.
        return Primary {
            class: Class::Hangul,
            weight: (lead << 16) | ((vowel + 1) << 8) | tail,
        };
    }
    if let Some(lead) = LEADING_JAMO.iter().position(|&j| j == c) {
        return Primary { class: Class::Hangul, weight: (lead as u32) << 16 };
    }
    if ('\u{3130}'..='\u{318F}').contains(&c) {
        // Remaining compatibility jamo (vowels, clusters) trail all syllables.
        return Primary { class: Class::Hangul, weight: 0x00FF_0000 | cp };
    }
    if ('\u{4E00}'..='\u{9FFF}').contains(&c) || ('\u{3400}'..='\u{4DBF}').contains(&c) {
        return Primary { class: Class::Han, weight: cp };
    }
    if c.is_ascii_alphabetic() {
        return Primary { class: Class::Latin, weight: c.to_ascii_lowercase() as u32 };
    }
    if c.is_alphanumeric() {
        let folded = c.to_lowercase().next().unwrap_or(c);
        return Primary { class: Class::Other, weight: folded as u32 };
    }

    Primary { class: Class::Punctuation, weight: cp }
}

/// Compare two strings the way a Korean-locale sort would.
///
/// Whitespace sorts first, then punctuation and symbols, digits, Hangul (by
/// leading consonant, vowel, trailing consonant), Han, Latin letters
/// compared case-insensitively, and everything else. Ties are broken
/// lowercase-first and then by code point, so the ordering is total.
///
/// # Arguments
/// * `a` - Left-hand value
/// * `b` - Right-hand value
///
/// # Returns
/// * `Ordering` - Where `a` sorts relative to `b`
pub fn compare(a: &str, b: &str) -> Ordering {
    let primaries = a.chars().map(primary).cmp(b.chars().map(primary));
    if primaries != Ordering::Equal {
        return primaries;
    }

    // Same letters, different case: lowercase first.
    let case = a
        .chars()
        .map(|c| c.is_uppercase())
        .cmp(b.chars().map(|c| c.is_uppercase()));
    if case != Ordering::Equal {
        return case;
    }

    a.cmp(b)
}

/// Sort values in place with [`compare`].
pub fn sort(values: &mut [String]) {
    values.sort_by(|a, b| compare(a, b));
}
