// Static MTR network directory: lines, stations, names and colours
use crate::ntf_models::{LineRef, StationRef};
use lazy_static::lazy_static;
use std::collections::HashMap;

// ============================================================================
// Static Tables
// ============================================================================

type LineRow = (&'static str, &'static str, Option<&'static str>, &'static [&'static str]);

const MTR_LINES: &[LineRow] = &[
    ("AEL", "Airport Express", Some("00888A"), &["HOK", "KOW", "TSY", "AIR", "AWE"]),
    ("TCL", "Tung Chung Line", Some("F7943E"), &["HOK", "KOW", "OLY", "NAC", "LAK", "TSY", "SUN", "TUC"]),
    (
        "TML",
        "Tuen Ma Line",
        Some("923011"),
        &[
            "WKS", "MOS", "HEO", "TSH", "SHM", "CIO", "STW", "CKT", "TAW", "HIK", "DIH", "KAT", "SUW",
            "TKW", "HOM", "HUH", "ETS", "AUS", "NAC", "MEF", "TWW", "KSR", "YUL", "LOP", "TIS", "SIH",
            "TUM",
        ],
    ),
    ("TKL", "Tseung Kwan O Line", Some("7D499D"), &["NOP", "QUB", "YAT", "TIK", "TKO", "LHP", "HAH", "POA"]),
    (
        "EAL",
        "East Rail Line",
        Some("5EB6E4"),
        &[
            "ADM", "EXC", "HUH", "MKK", "KOT", "TAW", "SHT", "FOT", "RAC", "UNI", "TAP", "TWO", "FAN",
            "SHS", "LOW", "LMC",
        ],
    ),
    ("SIL", "South Island Line", Some("CBD300"), &["ADM", "OCP", "WCH", "LET", "SOH"]),
    (
        "TWL",
        "Tsuen Wan Line",
        Some("ED1D24"),
        &[
            "CEN", "ADM", "TST", "JOR", "YMT", "MOK", "PRE", "SSP", "CSW", "LCK", "MEF", "LAK", "KWF",
            "KWH", "TWH", "TSW",
        ],
    ),
    (
        "ISL",
        "Island Line",
        Some("007DC5"),
        &[
            "KET", "HKU", "SYP", "SHW", "CEN", "ADM", "WAC", "CAB", "TIH", "FOH", "NOP", "QUB", "TAK",
            "SWH", "SKW", "HFC", "CHW",
        ],
    ),
    (
        "KTL",
        "Kwun Tong Line",
        Some("00AB4E"),
        &[
            "WHA", "HOM", "YMT", "MOK", "PRE", "SKM", "KOT", "LOF", "WTS", "DIH", "CHH", "KOB", "NTK",
            "KWT", "LAT", "YAT", "TIK",
        ],
    ),
    ("DRL", "Disneyland Resort Line", Some("F173AC"), &["SUN", "DIS"]),
];

const MTR_STATION_NAMES: &[(&str, &str)] = &[
    // Airport Express / Tung Chung
    ("HOK", "Hong Kong"),
    ("KOW", "Kowloon"),
    ("TSY", "Tsing Yi"),
    ("AIR", "Airport"),
    ("AWE", "AsiaWorld Expo"),
    ("OLY", "Olympic"),
    ("NAC", "Nam Cheong"),
    ("LAK", "Lai King"),
    ("SUN", "Sunny Bay"),
    ("TUC", "Tung Chung"),
    // Tuen Ma
    ("WKS", "Wu Kai Sha"),
    ("MOS", "Ma On Shan"),
    ("HEO", "Heng On"),
    ("TSH", "Tai Shui Hang"),
    ("SHM", "Shek Mun"),
    ("CIO", "City One"),
    ("STW", "Sha Tin Wai"),
    ("CKT", "Che Kung Temple"),
    ("TAW", "Tai Wai"),
    ("HIK", "Hin Keng"),
    ("DIH", "Diamond Hill"),
    ("KAT", "Kai Tak"),
    ("SUW", "Sung Wong Toi"),
    ("TKW", "To Kwa Wan"),
    ("HOM", "Ho Man Tin"),
    ("HUH", "Hung Hom"),
    ("ETS", "East Tsim Sha Tsui"),
    ("AUS", "Austin"),
    ("MEF", "Mei Foo"),
    ("TWW", "Tsuen Wan West"),
    ("KSR", "Kam Sheung Road"),
    ("YUL", "Yuen Long"),
    ("LOP", "Long Ping"),
    ("TIS", "Tin Shui Wai"),
    ("SIH", "Siu Hong"),
    ("TUM", "Tuen Mun"),
    // Tseung Kwan O
    ("NOP", "North Point"),
    ("QUB", "Quarry Bay"),
    ("YAT", "Yau Tong"),
    ("TIK", "Tiu Keng Leng"),
    ("TKO", "Tseung Kwan O"),
    ("LHP", "LOHAS Park"),
    ("HAH", "Hang Hau"),
    ("POA", "Po Lam"),
    // East Rail
    ("ADM", "Admiralty"),
    ("EXC", "Exhibition Centre"),
    ("MKK", "Mong Kok East"),
    ("KOT", "Kowloon Tong"),
    ("SHT", "Sha Tin"),
    ("FOT", "Fo Tan"),
    ("RAC", "Racecourse"),
    ("UNI", "University"),
    ("TAP", "Tai Po Market"),
    ("TWO", "Tai Wo"),
    ("FAN", "Fanling"),
    ("SHS", "Sheung Shui"),
    ("LOW", "Lo Wu"),
    ("LMC", "Lok Ma Chau"),
    // South Island
    ("OCP", "Ocean Park"),
    ("WCH", "Wong Chuk Hang"),
    ("LET", "Lei Tung"),
    ("SOH", "South Horizons"),
    // Tsuen Wan
    ("CEN", "Central"),
    ("TST", "Tsim Sha Tsui"),
    ("JOR", "Jordan"),
    ("YMT", "Yau Ma Tei"),
    ("MOK", "Mong Kok"),
    ("PRE", "Prince Edward"),
    ("SSP", "Sham Shui Po"),
    ("CSW", "Cheung Sha Wan"),
    ("LCK", "Lai Chi Kok"),
    ("KWF", "Kwai Fong"),
    ("KWH", "Kwai Hing"),
    ("TWH", "Tai Wo Hau"),
    ("TSW", "Tsuen Wan"),
    // Island
    ("KET", "Kennedy Town"),
    ("HKU", "HKU"),
    ("SYP", "Sai Ying Pun"),
    ("SHW", "Sheung Wan"),
    ("WAC", "Wan Chai"),
    ("CAB", "Causeway Bay"),
    ("TIH", "Tin Hau"),
    ("FOH", "Fortress Hill"),
    ("TAK", "Tai Koo"),
    ("SWH", "Sai Wan Ho"),
    ("SKW", "Shau Kei Wan"),
    ("HFC", "Heng Fa Chuen"),
    ("CHW", "Chai Wan"),
    // Kwun Tong
    ("WHA", "Whampoa"),
    ("SKM", "Shek Kip Mei"),
    ("LOF", "Lok Fu"),
    ("WTS", "Wong Tai Sin"),
    ("CHH", "Choi Hung"),
    ("KOB", "Kowloon Bay"),
    ("NTK", "Ngau Tau Kok"),
    ("KWT", "Kwun Tong"),
    ("LAT", "Lam Tin"),
    // Disneyland Resort
    ("DIS", "Disneyland Resort"),
];

lazy_static! {
    static ref MTR_DIRECTORY: StationDirectory = StationDirectory::from_tables(MTR_LINES, MTR_STATION_NAMES);
}

// ============================================================================
// Directory
// ============================================================================

/// One entry of the map index: a station and every line that calls there.
#[derive(Debug, Clone)]
pub struct StationEntry<'a> {
    pub station: &'a StationRef,
    pub lines: Vec<&'a LineRef>,
}

impl StationEntry<'_> {
    pub fn is_interchange(&self) -> bool {
        self.lines.len() > 1
    }
}

/// Read-only line/station lookups. Built once and never mutated.
#[derive(Debug, Clone)]
pub struct StationDirectory {
    lines: Vec<LineRef>,
    names: HashMap<String, String>,
}

impl StationDirectory {
    /// The process-wide MTR directory.
    pub fn mtr() -> &'static StationDirectory {
        &MTR_DIRECTORY
    }

    pub fn new(lines: Vec<LineRef>, names: HashMap<String, String>) -> Self {
        StationDirectory { lines, names }
    }

    fn from_tables(lines: &[LineRow], names: &[(&str, &str)]) -> Self {
        let names: HashMap<String, String> = names
            .iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();

        let lines = lines
            .iter()
            .map(|(id, name, color, stations)| LineRef {
                id: id.to_string(),
                name: name.to_string(),
                color: color.map(String::from),
                stations: stations
                    .iter()
                    .map(|station_id| StationRef {
                        id: station_id.to_string(),
                        name: names
                            .get(*station_id)
                            .cloned()
                            .unwrap_or_else(|| station_id.to_string()),
                    })
                    .collect(),
            })
            .collect();

        StationDirectory::new(lines, names)
    }

    /// All lines in directory order.
    pub fn lines(&self) -> &[LineRef] {
        &self.lines
    }

    pub fn line_by_id(&self, id: &str) -> Option<&LineRef> {
        self.lines.iter().find(|l| l.id.eq_ignore_ascii_case(id.trim()))
    }

    /// Display name for a station id, or the id itself when unknown.
    pub fn station_name(&self, id: &str) -> String {
        self.names
            .get(id)
            .or_else(|| self.names.get(&id.trim().to_ascii_uppercase()))
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Lines calling at `station_id`, in directory order.
    pub fn lines_serving(&self, station_id: &str) -> Vec<&LineRef> {
        self.lines.iter().filter(|l| l.serves(station_id)).collect()
    }

    pub fn is_interchange(&self, station_id: &str) -> bool {
        self.lines_serving(station_id).len() > 1
    }

    /// Stations offered once `line_id` is selected. Empty for an unknown line.
    pub fn stations_of(&self, line_id: &str) -> &[StationRef] {
        self.line_by_id(line_id)
            .map(|l| l.stations.as_slice())
            .unwrap_or(&[])
    }

    /// Canonical station ref for a (possibly lower-case) id, if any line calls there.
    pub fn station(&self, station_id: &str) -> Option<&StationRef> {
        let station_id = station_id.trim();
        self.lines
            .iter()
            .flat_map(|l| l.stations.iter())
            .find(|s| s.id.eq_ignore_ascii_case(station_id))
    }

    /// Every distinct station with its serving lines, first-seen order.
    pub fn station_index(&self) -> Vec<StationEntry<'_>> {
        let mut entries: Vec<StationEntry<'_>> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for line in &self.lines {
            for station in &line.stations {
                match positions.get(station.id.as_str()) {
                    Some(&pos) => entries[pos].lines.push(line),
                    None => {
                        positions.insert(station.id.as_str(), entries.len());
                        entries.push(StationEntry { station, lines: vec![line] });
                    }
                }
            }
        }

        entries
    }
}
