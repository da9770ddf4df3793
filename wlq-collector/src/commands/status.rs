//! Status command: one descriptor poll and one quality poll.

use serde::Serialize;
use wlq_probe::{parse_link_descriptor, ExtractError, LinkStatusSource, QualityExtractor};
use wlq_schema::{LinkQualitySample, LinkStatusSnapshot};

use super::CommandResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusResult {
    pub snapshot: LinkStatusSnapshot,
    /// `None` when the link dropped between the two polls.
    pub sample: Option<LinkQualitySample>,
}

pub fn execute_status<L: LinkStatusSource + ?Sized>(link: &L) -> CommandResult<StatusResult> {
    let snapshot = parse_link_descriptor(&link.descriptor()?)?;

    let sample = match QualityExtractor::default().extract(&link.quality()?, snapshot.band) {
        Ok(sample) => Some(sample),
        Err(ExtractError::LinkDown) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(StatusResult { snapshot, sample })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandError;
    use wlq_probe::ScriptedLinkSource;
    use wlq_schema::Band;

    const INFO: &str = "Interface wlo1
\tssid attic
\tchannel 6 (2437 MHz), width: 20 MHz
";

    const LINK: &str = "Connected to 10:20:30:40:50:61 (on wlo1)
\tsignal: -67 dBm
\trx bitrate: 72.2 MBit/s MCS 7 short GI
\ttx bitrate: 65.0 MBit/s MCS 6
";

    #[test]
    fn test_status_reports_snapshot_and_sample() {
        let link = ScriptedLinkSource::new(INFO, vec![LINK.to_string()]);
        let status = execute_status(&link).expect("status");

        assert_eq!(status.snapshot.ssid, "attic");
        assert_eq!(status.snapshot.band, Band::Ghz2_4);
        assert_eq!(status.snapshot.center_frequency_mhz, 2437);

        let sample = status.sample.expect("sample");
        assert_eq!(sample.signal_dbm, -67);
        assert_eq!(sample.rx_mcs, 7);
        assert_eq!(sample.tx_mcs, 6);
        assert_eq!(sample.nss, 1);
    }

    #[test]
    fn test_status_link_dropped_between_polls() {
        let link = ScriptedLinkSource::new(INFO, vec!["Not connected.".to_string()]);
        let status = execute_status(&link).expect("status");
        assert_eq!(status.sample, None);
    }

    #[test]
    fn test_status_serializes() {
        let link = ScriptedLinkSource::new(INFO, vec![LINK.to_string()]);
        let status = execute_status(&link).expect("status");
        let json: serde_json::Value = serde_json::to_value(&status).expect("json");
        assert_eq!(json["snapshot"]["ssid"], "attic");
        assert_eq!(json["snapshot"]["band"], "2.4GHz");
        assert_eq!(json["sample"]["signal_dbm"], -67);
    }

    #[test]
    fn test_status_not_connected() {
        let link = ScriptedLinkSource::new("Not connected.", vec![]);
        let err = execute_status(&link).unwrap_err();
        assert!(matches!(err, CommandError::LinkStatus(ExtractError::LinkDown)));
    }
}
