//! Wide strings passed as `wchar_t*`

use std::fmt;

/// Width of the platform `wchar_t` in bytes (2 on Windows, 4 elsewhere)
pub const WCHAR_WIDTH: usize = std::mem::size_of::<libc::wchar_t>();

/// Text marked for wide-character marshalling
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WString(String);

impl WString {
    pub fn new(s: impl Into<String>) -> Self {
        WString(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Encode as null-terminated `wchar_t` units (UTF-16 or UTF-32 by platform width)
    pub fn to_wide(&self) -> Vec<libc::wchar_t> {
        let mut units: Vec<libc::wchar_t> = if WCHAR_WIDTH == 2 {
            self.0.encode_utf16().map(|u| u as libc::wchar_t).collect()
        } else {
            self.0.chars().map(|c| c as u32 as libc::wchar_t).collect()
        };
        units.push(0);
        units
    }

    /// Decode `wchar_t` units, stopping at the first zero unit.
    /// Invalid code points become U+FFFD.
    pub fn from_wide(units: &[libc::wchar_t]) -> Self {
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        let units = &units[..end];
        let text = if WCHAR_WIDTH == 2 {
            let utf16: Vec<u16> = units.iter().map(|&u| u as u16).collect();
            String::from_utf16_lossy(&utf16)
        } else {
            units
                .iter()
                .map(|&u| char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        };
        WString(text)
    }
}

impl From<&str> for WString {
    fn from(s: &str) -> Self {
        WString(s.to_string())
    }
}

impl From<String> for WString {
    fn from(s: String) -> Self {
        WString(s)
    }
}

impl fmt::Display for WString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
