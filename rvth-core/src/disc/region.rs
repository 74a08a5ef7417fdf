//! Region-code derivation (§4.7).

/// GameCube/Wii region code (`GCN_Region_Code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionCode {
    Japan,
    Usa,
    Pal,
    Free,
    SouthKorea,
    Unknown(u32),
}

impl RegionCode {
    pub fn from_u32(v: u32) -> RegionCode {
        match v {
            0 => RegionCode::Japan,
            1 => RegionCode::Usa,
            2 => RegionCode::Pal,
            3 => RegionCode::Free,
            4 => RegionCode::SouthKorea,
            other => RegionCode::Unknown(other),
        }
    }

    /// Derive from a GameCube `bi2.bin` region word at offset 0x440+0x18 (the
    /// `region_code` field of `GCN_Boot_Info`).
    pub fn from_gcn_bi2(bi2: &[u8]) -> Option<RegionCode> {
        let word = u32::from_be_bytes(bi2.get(0x18..0x1C)?.try_into().ok()?);
        Some(RegionCode::from_u32(word))
    }

    /// Derive from a Wii region-setting block: the first byte of the
    /// 32-bit region code at its start.
    pub fn from_wii_region_setting(block: &[u8]) -> Option<RegionCode> {
        let word = u32::from_be_bytes(block.get(0..4)?.try_into().ok()?);
        Some(RegionCode::from_u32(word))
    }
}
