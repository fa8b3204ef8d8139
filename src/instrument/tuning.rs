//! Scala scale files
//!
//! Only the `.scl` scale itself is read; keyboard mappings are fixed with
//! the first degree on middle C.

use super::LoadError;
use std::path::Path;

/// Key the first scale degree is mapped to
pub const ROOT_KEY: i32 = 60;

/// A scale as cents offsets of each degree above the root
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    description: String,
    /// Degrees 1..=n; the last entry is the period (usually 1200)
    cents: Vec<f64>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self::equal_temperament()
    }
}

impl Tuning {
    /// Twelve-tone equal temperament
    pub fn equal_temperament() -> Self {
        Self {
            description: "12-tone equal temperament".to_string(),
            cents: (1..=12).map(|i| i as f64 * 100.0).collect(),
        }
    }

    /// Load a `.scl` file
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_scala(&text)
    }

    /// Parse the text of a `.scl` file
    pub fn parse_scala(text: &str) -> Result<Self, LoadError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.starts_with('!'));

        let (_, description) = lines.next().ok_or_else(|| LoadError::Scala {
            line: 1,
            message: "missing description".to_string(),
        })?;

        let (count_line, count) = lines.next().ok_or_else(|| LoadError::Scala {
            line: 2,
            message: "missing note count".to_string(),
        })?;
        let count: usize = first_token(count).parse().map_err(|_| LoadError::Scala {
            line: count_line,
            message: format!("invalid note count '{}'", count),
        })?;

        let mut cents = Vec::with_capacity(count);
        let mut last_line = count_line;
        for (line, text) in lines.by_ref().filter(|(_, l)| !l.is_empty()).take(count) {
            cents.push(parse_pitch(first_token(text)).ok_or_else(|| LoadError::Scala {
                line,
                message: format!("invalid pitch '{}'", text),
            })?);
            last_line = line;
        }

        if cents.len() < count {
            return Err(LoadError::Scala {
                line: last_line,
                message: format!("expected {} pitches, found {}", count, cents.len()),
            });
        }

        if cents.is_empty() {
            return Err(LoadError::Scala {
                line: count_line,
                message: "scale has no degrees".to_string(),
            });
        }

        Ok(Self {
            description: description.to_string(),
            cents,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Number of degrees per period
    pub fn len(&self) -> usize {
        self.cents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cents.is_empty()
    }

    /// Size of the repeating period in cents
    pub fn period(&self) -> f64 {
        self.cents.last().copied().unwrap_or(1200.0)
    }

    /// Offset of `key` from the root key, in cents
    pub fn cents_for_key(&self, key: u8) -> f64 {
        let steps = self.cents.len() as i32;
        if steps == 0 {
            return (key as i32 - ROOT_KEY) as f64 * 100.0;
        }
        let offset = key as i32 - ROOT_KEY;
        let octave = offset.div_euclid(steps);
        let degree = offset.rem_euclid(steps) as usize;
        let within = if degree == 0 { 0.0 } else { self.cents[degree - 1] };
        octave as f64 * self.period() + within
    }

    /// Frequency ratio of `key` relative to the root key
    pub fn ratio_for_key(&self, key: u8) -> f64 {
        2f64.powf(self.cents_for_key(key) / 1200.0)
    }
}

fn first_token(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn parse_pitch(token: &str) -> Option<f64> {
    if token.contains('.') {
        return token.parse::<f64>().ok().filter(|c| c.is_finite());
    }
    let (num, den) = match token.split_once('/') {
        Some((n, d)) => (n.parse::<f64>().ok()?, d.parse::<f64>().ok()?),
        None => (token.parse::<f64>().ok()?, 1.0),
    };
    if num <= 0.0 || den <= 0.0 {
        return None;
    }
    Some(1200.0 * (num / den).log2())
}
