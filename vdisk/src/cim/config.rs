//! Caller expectations checked when opening a container

use super::header::CimInfo;

/// Geometry a caller expects to find in an existing container.
///
/// Unset fields are not checked. Mismatches are logged; the stored header
/// is always used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CimGeometry {
    pub size_mb: Option<u32>,
    pub cluster_size: Option<u8>,
    pub cluster_count: Option<u16>,
}

impl CimGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size_mb(mut self, size_mb: u32) -> Self {
        self.size_mb = Some(size_mb);
        self
    }

    pub fn cluster_size(mut self, multiplier: u8) -> Self {
        self.cluster_size = Some(multiplier);
        self
    }

    pub fn cluster_count(mut self, count: u16) -> Self {
        self.cluster_count = Some(count);
        self
    }

    /// Describe every field that disagrees with `info`
    pub fn mismatches(&self, info: &CimInfo) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(mb) = self.size_mb {
            if mb != info.max_size as u32 {
                out.push(format!("size {} MB, stored {} MB", mb, info.max_size));
            }
        }
        if let Some(mult) = self.cluster_size {
            if mult != info.cluster_size {
                out.push(format!(
                    "cluster size x{}, stored x{}",
                    mult, info.cluster_size
                ));
            }
        }
        if let Some(count) = self.cluster_count {
            if count != info.cluster_count {
                out.push(format!(
                    "cluster count {}, stored {}",
                    count, info.cluster_count
                ));
            }
        }
        out
    }
}
