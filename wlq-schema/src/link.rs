//! Link descriptor and link quality types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wireless band the association is on.
///
/// The band decides which quality fields `iw` is guaranteed to report:
/// 2.4 GHz links often omit MCS/NSS, 5 and 6 GHz links never should.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[serde(rename = "5GHz")]
    Ghz5,
    #[serde(rename = "6GHz")]
    Ghz6,
}

impl Band {
    /// Classify a channel frequency in MHz.
    pub fn from_frequency_mhz(mhz: u32) -> Option<Self> {
        match mhz {
            2400..=2500 => Some(Band::Ghz2_4),
            4900..=5924 => Some(Band::Ghz5),
            5925..=7125 => Some(Band::Ghz6),
            _ => None,
        }
    }

    /// Whether a missing MCS/NSS field may default to zero on this band.
    pub fn tolerates_missing_mcs(&self) -> bool {
        matches!(self, Band::Ghz2_4)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Band::Ghz2_4 => "2.4GHz",
            Band::Ghz5 => "5GHz",
            Band::Ghz6 => "6GHz",
        };
        f.write_str(label)
    }
}

/// Facts about the association, read once before sampling starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatusSnapshot {
    pub ssid: String,
    pub channel: u32,
    /// Primary channel frequency.
    pub frequency_mhz: u32,
    pub bandwidth_mhz: u32,
    /// Center frequency of the full channel width (`center1`).
    pub center_frequency_mhz: u32,
    pub band: Band,
}

/// One parse of the periodic link quality output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkQualitySample {
    pub signal_dbm: i32,
    pub rx_bitrate_mbps: f64,
    pub tx_bitrate_mbps: f64,
    pub rx_mcs: u8,
    pub tx_mcs: u8,
    /// Spatial streams on the receive side.
    pub nss: u8,
}
