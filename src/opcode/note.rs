//! Note-name parsing (`c4`, `f#2`, `eb-1`)

/// Parse a note name into a MIDI note number
///
/// Middle C is `c4` = 60. Accepts `#`/`♯` and `b`/`♭` accidentals and a
/// signed octave. Returns `None` for anything that is not a note name or
/// that falls outside 0..=127.
pub fn parse_note(text: &str) -> Option<u8> {
    let text = text.trim();
    let mut chars = text.char_indices().peekable();

    let base: i32 = match chars.next()?.1.to_ascii_lowercase() {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };

    let accidental = match chars.peek().map(|(_, c)| *c) {
        Some('#') | Some('♯') => {
            chars.next();
            1
        }
        Some('b') | Some('♭') => {
            chars.next();
            -1
        }
        _ => 0,
    };

    let octave_start = chars.peek().map(|(i, _)| *i)?;
    let octave: i32 = text[octave_start..].parse().ok()?;
    if !(-1..=9).contains(&octave) {
        return None;
    }

    let note = (octave + 1) * 12 + base + accidental;
    u8::try_from(note).ok().filter(|n| *n <= 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middle_c() {
        assert_eq!(parse_note("c4"), Some(60));
        assert_eq!(parse_note("C4"), Some(60));
    }

    #[test]
    fn test_accidentals() {
        assert_eq!(parse_note("c#4"), Some(61));
        assert_eq!(parse_note("db4"), Some(61));
        assert_eq!(parse_note("a4"), Some(69));
    }

    #[test]
    fn test_extremes() {
        assert_eq!(parse_note("c-1"), Some(0));
        assert_eq!(parse_note("g9"), Some(127));
        assert_eq!(parse_note("g#9"), None);
        assert_eq!(parse_note("cb-1"), None);
        assert_eq!(parse_note("c200000000"), None);
        assert_eq!(parse_note("c-2147483648"), None);
    }

    #[test]
    fn test_not_a_note() {
        assert_eq!(parse_note("60"), None);
        assert_eq!(parse_note("h4"), None);
        assert_eq!(parse_note("c"), None);
        assert_eq!(parse_note(""), None);
    }
}
