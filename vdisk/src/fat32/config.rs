//! Format configuration

/// Options for [`Fat32Volume::format_with`](super::Fat32Volume::format_with)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// Volume label, at most 11 characters
    pub label: String,
    /// OEM name written to the boot sector
    pub oem_name: [u8; 8],
    /// Volume serial; taken from the clock when unset
    pub volume_id: Option<u32>,
    pub reserved_sectors: u16,
    pub num_fats: u8,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            label: String::from("NO NAME"),
            oem_name: *b"KLIVEIDE",
            volume_id: None,
            reserved_sectors: 32,
            num_fats: 2,
        }
    }
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn volume_id(mut self, id: u32) -> Self {
        self.volume_id = Some(id);
        self
    }

    pub fn oem_name(mut self, oem: [u8; 8]) -> Self {
        self.oem_name = oem;
        self
    }

    /// Label as stored: upper case, space padded to 11 bytes
    pub fn label_bytes(&self) -> [u8; 11] {
        let mut out = [b' '; 11];
        for (slot, b) in out
            .iter_mut()
            .zip(self.label.bytes().filter(|b| b.is_ascii_graphic() || *b == b' '))
        {
            *slot = b.to_ascii_uppercase();
        }
        out
    }
}

/// Sectors per cluster by volume size
pub fn sectors_per_cluster_for(total_sectors: u64) -> u8 {
    let size_mb = total_sectors / 2048;
    match size_mb {
        0..=1023 => 1,
        1024..=2047 => 4,
        2048..=8191 => 8,
        _ => 16,
    }
}

/// FAT size in sectors (Microsoft FAT32 sizing formula)
pub fn calculate_fat_size(
    total_sectors: u32,
    reserved_sectors: u16,
    sectors_per_cluster: u8,
    num_fats: u8,
) -> u32 {
    let tmp1 = total_sectors - reserved_sectors as u32;
    let tmp2 = ((256 * sectors_per_cluster as u32) + num_fats as u32) / 2;
    tmp1.div_ceil(tmp2)
}
