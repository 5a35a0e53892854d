//! Rename table and the combined whole-word symbol matcher.

use std::borrow::Cow;
use std::collections::BTreeMap;

use regex::bytes::{Captures as BytesCaptures, Regex as BytesRegex};
use regex::{Captures, Regex};
use tracing::debug;

use crate::spec::CopyTreeError;

////////////////////////////////////////////////////////////////////////////////
// #region RenameTable

/// Old symbol -> new symbol mapping.
///
/// Keys are unique; inserting an existing key replaces its value. Iteration is
/// sorted by key so everything derived from the table is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameTable {
    map_symbols: BTreeMap<String, String>,
}

impl RenameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `OLD=NEW` strings.
    ///
    /// A string that does not split into exactly two parts on `=` (e.g.
    /// `"noequals"` or `"a=b=c"`) contributes nothing and raises no error.
    /// An empty `OLD` part is dropped the same way. An empty `NEW` part is
    /// kept and deletes the symbol (`"legacy="` maps `legacy` to nothing;
    /// a split that discards trailing empty parts would drop it instead).
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let l_parts: Vec<&str> = pair.split('=').collect();
            let [symbol_old, symbol_new] = l_parts.as_slice() else {
                debug!(entry = pair, "map entry dropped: expected exactly one `=`");
                continue;
            };
            if symbol_old.is_empty() {
                debug!(entry = pair, "map entry dropped: empty symbol");
                continue;
            }
            debug!("map: {symbol_old} -> {symbol_new}");
            table.insert(*symbol_old, *symbol_new);
        }
        table
    }

    /// Insert one mapping, returning the replaced value for a duplicate key.
    pub fn insert(
        &mut self,
        symbol_old: impl Into<String>,
        symbol_new: impl Into<String>,
    ) -> Option<String> {
        self.map_symbols.insert(symbol_old.into(), symbol_new.into())
    }

    pub fn get(&self, symbol_old: &str) -> Option<&str> {
        self.map_symbols.get(symbol_old).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map_symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map_symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map_symbols
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for RenameTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (symbol_old, symbol_new) in iter {
            table.insert(symbol_old, symbol_new);
        }
        table
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CombinedPattern

/// One compiled matcher recognizing every table key as a whole word.
///
/// An empty table compiles to "no matcher": nothing matches and substitution
/// is the identity.
#[derive(Debug, Clone)]
pub struct CombinedPattern {
    map_symbols: BTreeMap<String, String>,
    regex_text: Option<Regex>,
    regex_bytes: Option<BytesRegex>,
}

impl CombinedPattern {
    /// Compile the table keys into `\b(?:k1|k2|...)\b`.
    ///
    /// Keys are escaped, so symbols are always literal text. Longer keys come
    /// first in the alternation: for keys `a.b` and `a`, text `a.b` matches
    /// the former.
    pub fn compile(table: &RenameTable) -> Result<Self, CopyTreeError> {
        let mut l_symbols: Vec<&str> = table
            .iter()
            .map(|(k, _)| k)
            .filter(|k| !k.is_empty())
            .collect();
        if l_symbols.is_empty() {
            return Ok(Self {
                map_symbols: BTreeMap::new(),
                regex_text: None,
                regex_bytes: None,
            });
        }
        l_symbols.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let c_alternation = l_symbols
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let c_pattern = format!(r"\b(?:{c_alternation})\b");
        debug!("Pattern: {c_pattern}");

        let regex_text = Regex::new(&c_pattern).map_err(|e| {
            CopyTreeError::InvalidPattern(format!("Failed to compile rename table: {e}"))
        })?;
        let regex_bytes = BytesRegex::new(&c_pattern).map_err(|e| {
            CopyTreeError::InvalidPattern(format!("Failed to compile rename table: {e}"))
        })?;

        Ok(Self {
            map_symbols: table
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            regex_text: Some(regex_text),
            regex_bytes: Some(regex_bytes),
        })
    }

    /// True when the pattern can never match.
    pub fn is_empty(&self) -> bool {
        self.regex_text.is_none()
    }

    /// Pattern source text, `None` for an empty table.
    pub fn as_str(&self) -> Option<&str> {
        self.regex_text.as_ref().map(Regex::as_str)
    }

    fn replacement_for<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.map_symbols
            .get(symbol)
            .map(String::as_str)
            .unwrap_or(symbol)
    }

    /// Replace every whole-word symbol in `text` in one left-to-right pass.
    ///
    /// Replacement text is never rescanned. Returns the input borrowed when
    /// nothing matched.
    pub fn sed<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let Some(regex) = &self.regex_text else {
            return Cow::Borrowed(text);
        };
        regex.replace_all(text, |caps: &Captures<'_>| {
            self.replacement_for(&caps[0]).to_string()
        })
    }

    /// Byte-oriented [`Self::sed`] for file content, plus the replacement count.
    ///
    /// Bytes that are not valid UTF-8 are passed through untouched.
    pub fn sed_bytes<'t>(&self, line: &'t [u8]) -> (Cow<'t, [u8]>, u64) {
        let Some(regex) = &self.regex_bytes else {
            return (Cow::Borrowed(line), 0);
        };
        let mut n_replaced = 0_u64;
        let line_new = regex.replace_all(line, |caps: &BytesCaptures<'_>| {
            n_replaced += 1;
            let raw_symbol = &caps[0];
            match std::str::from_utf8(raw_symbol)
                .ok()
                .and_then(|symbol| self.map_symbols.get(symbol))
            {
                Some(symbol_new) => symbol_new.as_bytes().to_vec(),
                None => raw_symbol.to_vec(),
            }
        });
        (line_new, n_replaced)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
