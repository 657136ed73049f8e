//! Long name to 8.3 short name conversion
//!
//! Whitespace is stripped and reserved characters become `_`. A `~N` tail
//! is added whenever the short name cannot represent the long name exactly.

use super::error::NameError;
use super::types::MAX_LFN_LEN;
use bitflags::bitflags;

bitflags! {
    /// How a long name relates to its short name
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NameFlags: u8 {
        /// Characters were dropped or replaced
        const LOST_CHARS = 0x01;
        /// Upper and lower case in the same segment
        const MIXED_CASE = 0x02;
        /// Base is all lower case
        const LC_BASE = 0x08;
        /// Extension is all lower case
        const LC_EXT = 0x10;
    }
}

impl NameFlags {
    /// Either bit means the long name must be stored
    pub const NEED_LFN: Self = Self::LOST_CHARS.union(Self::MIXED_CASE);

    pub fn needs_lfn(self) -> bool {
        self.intersects(Self::NEED_LFN)
    }
}

/// A long name together with its short form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsName {
    /// Long name as given
    pub long_name: String,
    /// Space-padded 8.3 name, no dot
    pub sfn: [u8; 11],
    /// Position of the `~N` tail
    pub seq_pos: usize,
    pub flags: NameFlags,
}

impl FsName {
    /// Short base name without padding
    pub fn base(&self) -> String {
        trimmed(&self.sfn[..8])
    }

    /// Short extension without padding
    pub fn ext(&self) -> String {
        trimmed(&self.sfn[8..])
    }

    /// Short name in dotted form, e.g. `THEQUI~1.FOX`
    pub fn short_name(&self) -> String {
        let ext = self.ext();
        if ext.is_empty() {
            self.base()
        } else {
            format!("{}.{}", self.base(), ext)
        }
    }

    pub fn is_lossy(&self) -> bool {
        self.flags.contains(NameFlags::LOST_CHARS)
    }

    /// UTF-16 units of the long name
    pub fn utf16(&self) -> Vec<u16> {
        self.long_name.encode_utf16().collect()
    }
}

fn trimmed(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn is_reserved_sfn_char(c: char) -> bool {
    let cp = c as u32;
    if matches!(c, '"' | '|' | '[' | '\\' | ']') {
        return true;
    }
    // *+,./ (hyphen is allowed) and :;<=>?
    if (0x2A..=0x2F).contains(&cp) && cp != 0x2D {
        return true;
    }
    if (0x3A..=0x3F).contains(&cp) {
        return true;
    }
    !(0x21..=0x7E).contains(&cp)
}

/// Convert a long name to an 8.3 short name.
///
/// # Arguments
/// * `name` - Long file name
/// * `conflict_seq` - 0 for the first attempt; `n` produces a `~(n+1)` tail
///
/// # Returns
/// * The short form with its case and lossiness flags
///
/// # Examples
/// ```
/// use vdisk::fat32::name::convert_long_to_short_name;
/// let name = convert_long_to_short_name("The quick brown.fox", 0).unwrap();
/// assert_eq!(name.short_name(), "THEQUI~1.FOX");
/// ```
pub fn convert_long_to_short_name(name: &str, conflict_seq: u32) -> Result<FsName, NameError> {
    if name.trim().is_empty() {
        return Err(NameError::Blank);
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(NameError::LeadingOrTrailingSpace);
    }
    if name.ends_with('.') {
        return Err(NameError::TrailingDot);
    }
    let seq = conflict_seq + 1;
    if seq > 999 {
        return Err(NameError::SequenceOutOfRange(seq));
    }

    let chars: Vec<char> = name.chars().filter(|c| !c.is_whitespace()).collect();
    let mut lossy = chars.len() != name.chars().count();
    let end = chars.len();

    // Skip leading dots; the extension starts after the last remaining dot
    let mut start = 0;
    while start < end && chars[start] == '.' {
        start += 1;
    }
    if start > 0 {
        lossy = true;
    }
    let dot = (start + 1..end)
        .rev()
        .find(|&i| chars[i] == '.')
        .unwrap_or(start);

    let mut sfn = [b' '; 11];
    let mut i = 0usize;
    let mut limit = 7usize;
    let mut seq_pos = 0usize;
    let mut bit = NameFlags::LC_BASE;
    let mut lower = NameFlags::empty();
    let mut upper = NameFlags::empty();

    let mut p = start;
    while p < end {
        let mut c = chars[p];
        if c == '.' && p == dot {
            limit = 10;
            i = 8;
            bit = NameFlags::LC_EXT;
            p += 1;
            continue;
        }
        if is_reserved_sfn_char(c) {
            lossy = true;
            if (0x80..=0xBF).contains(&(c as u32)) {
                p += 1;
                continue;
            }
            c = '_';
        }
        if i > limit {
            lossy = true;
            if limit == 10 || p > dot {
                break;
            }
            // Base is full; continue with the extension
            p = dot;
            continue;
        }
        if c.is_ascii_lowercase() {
            c = c.to_ascii_uppercase();
            lower |= bit;
        } else if c.is_ascii_uppercase() {
            upper |= bit;
        }
        sfn[i] = c as u8;
        i += 1;
        if i < 7 {
            seq_pos = i;
        }
        p += 1;
    }

    if sfn[0] == b' ' {
        return Err(NameError::NoShortName);
    }

    let flags = if !lossy && conflict_seq == 0 {
        if lower.intersects(upper) {
            NameFlags::MIXED_CASE
        } else {
            lower
        }
    } else {
        let digits = seq.to_string();
        let pos = seq_pos.min(7 - digits.len());
        sfn[pos] = b'~';
        sfn[pos + 1..pos + 1 + digits.len()].copy_from_slice(digits.as_bytes());
        seq_pos = pos;
        NameFlags::LOST_CHARS
    };

    Ok(FsName {
        long_name: name.to_string(),
        sfn,
        seq_pos,
        flags,
    })
}

/// Checksum binding long-name entries to their short entry
pub fn calc_short_name_checksum(name: &[u8; 11]) -> u8 {
    name.iter()
        .fold(0u8, |sum, &b| (sum >> 1 | sum << 7).wrapping_add(b))
}

/// Validate one path component and prepare it for lookup.
///
/// A trailing dot is dropped.
pub fn parse_path_component(component: &str) -> Result<FsName, NameError> {
    if component.is_empty() {
        return Err(NameError::EmptySegment);
    }
    if let Some(c) = component
        .chars()
        .find(|&c| matches!(c, '"' | '*' | ':' | '<' | '>' | '?' | '\\' | '|') || (c as u32) < 0x20)
    {
        return Err(NameError::ReservedCharacter(c));
    }
    let name = component.strip_suffix('.').unwrap_or(component);
    if name.encode_utf16().count() > MAX_LFN_LEN {
        return Err(NameError::TooLong);
    }
    convert_long_to_short_name(name, 0)
}

/// Split a slash-separated path into components.
///
/// Returns whether the path is absolute, plus the components.
pub fn split_path(path: &str) -> Result<(bool, Vec<&str>), NameError> {
    let absolute = path.starts_with('/');
    let rest = path.trim_start_matches('/');
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok((absolute, Vec::new()));
    }
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(NameError::EmptySegment);
    }
    Ok((absolute, parts))
}
