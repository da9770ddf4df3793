//! Text extraction for `iw` output.
//!
//! Two shapes are understood:
//! - the link descriptor (`iw <iface> info`), read once per session
//! - the link quality block (`iw <iface> link`), read every tick
//!
//! Quality fields are pulled through an ordered rule table. For MCS and NSS
//! the most specific modulation family is tried first (EHT, HE, VHT, then
//! legacy HT `MCS n`).

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use wlq_schema::{Band, LinkQualitySample, LinkStatusSnapshot};

/// Errors from text extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("link is not connected")]
    LinkDown,

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("malformed {field}: '{value}'")]
    Malformed { field: String, value: String },
}

// =============================================================================
// Link descriptor
// =============================================================================

fn ssid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*ssid (.+?)\s*$").expect("valid regex"))
}

fn channel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"channel (\d+) \((\d+) MHz\)").expect("valid regex"))
}

fn width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"width: (\d+) MHz").expect("valid regex"))
}

fn center_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"center1: (\d+) MHz").expect("valid regex"))
}

/// True for the "not connected" sentinel `iw` prints when unassociated.
pub fn is_not_connected(text: &str) -> bool {
    text.trim().to_ascii_lowercase().starts_with("not connected")
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ExtractError> {
    value.trim().parse().map_err(|_| ExtractError::Malformed {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse the one-time link descriptor.
///
/// `center1` is optional (20 MHz channels may omit it); the primary frequency
/// stands in when it is absent.
pub fn parse_link_descriptor(text: &str) -> Result<LinkStatusSnapshot, ExtractError> {
    if is_not_connected(text) {
        return Err(ExtractError::LinkDown);
    }

    let ssid = ssid_re()
        .captures(text)
        .map(|c| c[1].to_string())
        .ok_or_else(|| ExtractError::MissingField("ssid".to_string()))?;

    let channel_caps = channel_re()
        .captures(text)
        .ok_or_else(|| ExtractError::MissingField("channel".to_string()))?;
    let channel: u32 = parse_number("channel", &channel_caps[1])?;
    let frequency_mhz: u32 = parse_number("frequency", &channel_caps[2])?;

    let bandwidth_mhz: u32 = match width_re().captures(text) {
        Some(c) => parse_number("width", &c[1])?,
        None => return Err(ExtractError::MissingField("width".to_string())),
    };

    let center_frequency_mhz: u32 = match center_re().captures(text) {
        Some(c) => parse_number("center1", &c[1])?,
        None => frequency_mhz,
    };

    let band = Band::from_frequency_mhz(frequency_mhz).ok_or_else(|| ExtractError::Malformed {
        field: "frequency".to_string(),
        value: frequency_mhz.to_string(),
    })?;

    Ok(LinkStatusSnapshot {
        ssid,
        channel,
        frequency_mhz,
        bandwidth_mhz,
        center_frequency_mhz,
        band,
    })
}

// =============================================================================
// Link quality
// =============================================================================

/// A field of `LinkQualitySample`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityField {
    Signal,
    RxBitrate,
    TxBitrate,
    RxMcs,
    TxMcs,
    Nss,
}

impl QualityField {
    pub fn name(&self) -> &'static str {
        match self {
            QualityField::Signal => "signal",
            QualityField::RxBitrate => "rx_bitrate",
            QualityField::TxBitrate => "tx_bitrate",
            QualityField::RxMcs => "rx_mcs",
            QualityField::TxMcs => "tx_mcs",
            QualityField::Nss => "nss",
        }
    }

    /// MCS and NSS may be absent on bands that tolerate it.
    fn band_optional(&self) -> bool {
        matches!(
            self,
            QualityField::RxMcs | QualityField::TxMcs | QualityField::Nss
        )
    }
}

/// One entry of the extraction table.
///
/// A rule applies to the first line whose trimmed text starts with `label`
/// (case-insensitive); `pattern` must have one capture group holding the value.
#[derive(Debug, Clone)]
pub struct QualityRule {
    field: QualityField,
    label: String,
    pattern: Regex,
    /// Maps a captured integer onto the field (HT NSS is derived from MCS).
    derive: Option<fn(u32) -> u32>,
}

impl QualityRule {
    pub fn new(field: QualityField, label: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            field,
            label: label.to_ascii_lowercase(),
            pattern: Regex::new(pattern)?,
            derive: None,
        })
    }

    /// Builder: transform the captured integer before storing it.
    pub fn with_derive(mut self, derive: fn(u32) -> u32) -> Self {
        self.derive = Some(derive);
        self
    }

    pub fn field(&self) -> QualityField {
        self.field
    }

    fn line<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.lines()
            .map(str::trim)
            .find(|line| line.to_ascii_lowercase().starts_with(&self.label))
    }
}

/// HT encodes spatial streams in the MCS index: 0-7 one stream, 8-15 two...
fn ht_streams(mcs: u32) -> u32 {
    mcs / 8 + 1
}

enum Lookup<'a> {
    Found { raw: String, rule: &'a QualityRule },
    /// A labelled line existed but no pattern matched it.
    LabelOnly(String),
    Absent,
}

/// Ordered rule table for `iw <iface> link` output.
#[derive(Debug, Clone)]
pub struct QualityExtractor {
    rules: Vec<QualityRule>,
}

impl Default for QualityExtractor {
    fn default() -> Self {
        let table: &[(QualityField, &str, &str)] = &[
            (QualityField::Signal, "signal:", r"signal:\s*(\S+)\s*(?:\[.*\]\s*)?dBm"),
            (QualityField::RxBitrate, "rx bitrate:", r"rx bitrate:\s*(\S+)\s*MBit/s"),
            (QualityField::TxBitrate, "tx bitrate:", r"tx bitrate:\s*(\S+)\s*MBit/s"),
            (QualityField::RxMcs, "rx bitrate:", r"EHT-MCS (\d+)"),
            (QualityField::RxMcs, "rx bitrate:", r"HE-MCS (\d+)"),
            (QualityField::RxMcs, "rx bitrate:", r"VHT-MCS (\d+)"),
            (QualityField::RxMcs, "rx bitrate:", r"(?:^|\s)MCS (\d+)"),
            (QualityField::TxMcs, "tx bitrate:", r"EHT-MCS (\d+)"),
            (QualityField::TxMcs, "tx bitrate:", r"HE-MCS (\d+)"),
            (QualityField::TxMcs, "tx bitrate:", r"VHT-MCS (\d+)"),
            (QualityField::TxMcs, "tx bitrate:", r"(?:^|\s)MCS (\d+)"),
            (QualityField::Nss, "rx bitrate:", r"EHT-NSS (\d+)"),
            (QualityField::Nss, "rx bitrate:", r"HE-NSS (\d+)"),
            (QualityField::Nss, "rx bitrate:", r"VHT-NSS (\d+)"),
        ];

        let mut rules: Vec<QualityRule> = table
            .iter()
            .map(|(field, label, pattern)| {
                QualityRule::new(*field, label, pattern).expect("valid built-in pattern")
            })
            .collect();
        rules.push(
            QualityRule::new(QualityField::Nss, "rx bitrate:", r"(?:^|\s)MCS (\d+)")
                .expect("valid built-in pattern")
                .with_derive(ht_streams),
        );

        Self { rules }
    }
}

impl QualityExtractor {
    /// Append a rule; it is tried after the existing rules for its field.
    pub fn with_rule(mut self, rule: QualityRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[QualityRule] {
        &self.rules
    }

    /// Extract one quality sample. `band` decides whether MCS/NSS may be absent.
    pub fn extract(&self, text: &str, band: Band) -> Result<LinkQualitySample, ExtractError> {
        if is_not_connected(text) {
            return Err(ExtractError::LinkDown);
        }

        Ok(LinkQualitySample {
            signal_dbm: self.number(text, QualityField::Signal)?,
            rx_bitrate_mbps: self.number(text, QualityField::RxBitrate)?,
            tx_bitrate_mbps: self.number(text, QualityField::TxBitrate)?,
            rx_mcs: self.index(text, QualityField::RxMcs, band)?,
            tx_mcs: self.index(text, QualityField::TxMcs, band)?,
            nss: self.index(text, QualityField::Nss, band)?,
        })
    }

    fn lookup(&self, text: &str, field: QualityField) -> Lookup<'_> {
        let mut labelled = None;
        for rule in self.rules.iter().filter(|r| r.field == field) {
            let Some(line) = rule.line(text) else {
                continue;
            };
            if let Some(caps) = rule.pattern.captures(line) {
                if let Some(value) = caps.get(1) {
                    return Lookup::Found {
                        raw: value.as_str().to_string(),
                        rule,
                    };
                }
            }
            labelled.get_or_insert_with(|| line.to_string());
        }
        match labelled {
            Some(line) => Lookup::LabelOnly(line),
            None => Lookup::Absent,
        }
    }

    fn missing(field: QualityField) -> ExtractError {
        ExtractError::MissingField(field.name().to_string())
    }

    fn number<T: std::str::FromStr>(&self, text: &str, field: QualityField) -> Result<T, ExtractError> {
        match self.lookup(text, field) {
            Lookup::Found { raw, .. } => parse_number(field.name(), &raw),
            Lookup::LabelOnly(line) => Err(ExtractError::Malformed {
                field: field.name().to_string(),
                value: line,
            }),
            Lookup::Absent => Err(Self::missing(field)),
        }
    }

    fn index(&self, text: &str, field: QualityField, band: Band) -> Result<u8, ExtractError> {
        match self.lookup(text, field) {
            Lookup::Found { raw, rule } => {
                let n: u32 = parse_number(field.name(), &raw)?;
                let n = rule.derive.map_or(n, |derive| derive(n));
                u8::try_from(n).map_err(|_| ExtractError::Malformed {
                    field: field.name().to_string(),
                    value: raw,
                })
            }
            Lookup::LabelOnly(_) | Lookup::Absent if field.band_optional() => {
                if band.tolerates_missing_mcs() {
                    Ok(0)
                } else {
                    Err(Self::missing(field))
                }
            }
            Lookup::LabelOnly(_) | Lookup::Absent => Err(Self::missing(field)),
        }
    }
}
