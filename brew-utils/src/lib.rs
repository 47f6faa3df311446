//! Shared utility functions for the brew crates.

/// Date utility functions
pub mod dates {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

    /// Format used when timestamps are written back out: "YYYY-MM-DDTHH:MM:SS.mmmZ"
    pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    /// Short label format for chart axes: "YYYY-MM-DD HH:MM"
    pub const SHORT_FORMAT: &str = "%Y-%m-%d %H:%M";

    const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

    /// Build a timestamp from the split date fields of a spreadsheet export.
    ///
    /// Year, month and day are mandatory. Two digit years are read as 20xx.
    /// Missing hour/minute/second default to zero.
    pub fn build_timestamp(
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
        hour: Option<u32>,
        minute: Option<u32>,
        second: Option<u32>,
    ) -> Option<NaiveDateTime> {
        let (year, month, day) = (year?, month?, day?);
        let year = if year < 100 { year + 2000 } else { year };
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(
            hour.unwrap_or(0),
            minute.unwrap_or(0),
            second.unwrap_or(0),
        )
    }

    /// Plant timestamps carry no zone; they are taken as UTC.
    pub fn as_utc(naive: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&naive)
    }

    /// Milliseconds since the Unix epoch.
    pub fn to_millis(timestamp: &DateTime<Utc>) -> f64 {
        timestamp.timestamp_millis() as f64
    }

    /// Inverse of [`to_millis`]; `None` for non-finite or out of range values.
    pub fn from_millis(millis: f64) -> Option<DateTime<Utc>> {
        if !millis.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis(millis.round() as i64)
    }

    /// Parse an RFC 3339 timestamp, or a zone-less one taken as UTC.
    pub fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(as_utc(naive));
            }
        }
        anyhow::bail!("unrecognised timestamp: {s:?}")
    }

    /// Format a timestamp as "YYYY-MM-DDTHH:MM:SS.mmmZ"
    pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
        timestamp.format(ISO_FORMAT).to_string()
    }

    /// Format a timestamp as "YYYY-MM-DD HH:MM"
    pub fn format_short(timestamp: &DateTime<Utc>) -> String {
        timestamp.format(SHORT_FORMAT).to_string()
    }

}

/// Text normalisation and equipment naming
pub mod text {
    /// Group name given to rows whose equipment column is empty.
    pub const UNASSIGNED_GROUP: &str = "SIN_TEILANL";

    /// Equipment families whose unit number is part of the group name.
    pub const NUMBERED_PREFIXES: [&str; 14] = [
        "cocedor", "macerador", "enfriador", "rotapool", "olla", "tanque", "tq", "filtro",
        "lavado", "trub", "ve", "molienda", "grits", "linea",
    ];

    /// Brewhouse process order, upstream first.
    pub const PROCESS_ORDER: [&str; 12] = [
        "molienda", "grits", "cocedor", "macerador", "filtro", "olla", "whirlpool", "trub",
        "enfriador", "ve", "tanque", "linea",
    ];

    /// Sort index for names that match no entry of [`PROCESS_ORDER`].
    pub const UNKNOWN_PROCESS_INDEX: usize = 999;

    fn fold_accent(c: char) -> char {
        match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
            'Á' | 'À' | 'Ä' | 'Â' | 'Ã' | 'Å' => 'A',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        }
    }

    /// Trim, strip accents, lowercase, turn `_`/`-` into spaces and collapse whitespace.
    pub fn normalize_text(s: &str) -> String {
        let folded: String = s
            .trim()
            .chars()
            .map(fold_accent)
            .flat_map(char::to_lowercase)
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        folded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Title-case each word, keeping "ve" as the acronym "VE".
    pub fn title_keep_acronyms(base: &str) -> String {
        if base.is_empty() {
            return UNASSIGNED_GROUP.to_string();
        }
        base.split(' ')
            .map(|word| {
                if word == "ve" {
                    return "VE".to_string();
                }
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Split a trailing unit number off a normalised name: "cocedor 01" -> ("cocedor", Some(1)).
    fn split_unit_number(s: &str) -> (&str, Option<u32>) {
        if let Some((head, tail)) = s.rsplit_once(' ') {
            if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
                return (head.trim(), tail.parse::<u32>().ok());
            }
        }
        (s, None)
    }

    /// Map a raw equipment name (TEILANL) to its equipment group.
    ///
    /// Units of the same family and number are grouped together
    /// ("COCEDOR_01" and "Cocedor 1" both become "Cocedor 1"); families
    /// outside [`NUMBERED_PREFIXES`] drop the number.
    pub fn equipment_group(raw: &str) -> String {
        let s = normalize_text(raw);
        if s.is_empty() {
            return UNASSIGNED_GROUP.to_string();
        }
        let (base, number) = split_unit_number(&s);
        if base.starts_with("reclamo ") {
            return title_keep_acronyms(base);
        }
        match number {
            Some(n) if NUMBERED_PREFIXES.iter().any(|p| base.starts_with(p)) => {
                format!("{} {}", title_keep_acronyms(base), n)
            }
            _ => title_keep_acronyms(base),
        }
    }

    /// Position of a machine name in the brewhouse process order.
    pub fn process_sort_index(name: &str) -> usize {
        let lower = name.to_lowercase();
        PROCESS_ORDER
            .iter()
            .position(|key| lower.contains(key))
            .unwrap_or(UNKNOWN_PROCESS_INDEX)
    }

}

/// Rounding, parsing and descriptive statistics
pub mod numbers {
    /// Round to the nearest integer, halves towards positive infinity.
    ///
    /// `-2.5` rounds to `-2`, where [`f64::round`] would give `-3`.
    pub fn round_half_up(value: f64) -> f64 {
        let floor = value.floor();
        if value - floor >= 0.5 {
            floor + 1.0
        } else {
            floor
        }
    }

    /// Round to a fixed number of decimals, halves up.
    pub fn round_to(value: f64, decimals: i32) -> f64 {
        let factor = 10f64.powi(decimals);
        round_half_up(value * factor) / factor
    }

    pub fn round2(value: f64) -> f64 {
        round_to(value, 2)
    }

    /// Parse a spreadsheet cell as a finite number.
    pub fn parse_number(s: &str) -> Option<f64> {
        s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Arithmetic mean, 0 for an empty slice.
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Population standard deviation (divides by n), 0 for an empty slice.
    pub fn population_std_dev(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let m = mean(values);
        let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
        variance.sqrt()
    }

    /// Sample standard deviation (divides by n - 1), 0 below two samples.
    pub fn sample_std_dev(values: &[f64]) -> f64 {
        if values.len() < 2 {
            return 0.0;
        }
        let m = mean(values);
        let squares = values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
        (squares / (values.len() - 1) as f64).sqrt()
    }

}
