//! Peak selection over power-scan output
//!
//! `rtl_power` emits one CSV row per sweep segment:
//!
//! ```txt
//! date, time, Hz low, Hz high, Hz step, samples, dB, dB, dB, …
//! ```
//!
//! Everything after the six header columns is one power reading per
//! frequency bin, starting at the row's low frequency and advancing by
//! the row's step. The selector walks every bin of every row and keeps
//! the single strongest reading it sees.

/// Power level standing in for "no usable reading" (dB)
///
/// Real readings are always well above this floor. A peak at exactly
/// this level means the scan produced nothing usable and the caller
/// must rescan rather than lock.
pub const NO_SIGNAL_DB: f64 = -200.0;

/// Count of non-reading columns at the start of each row
const HEADER_FIELDS: usize = 6;

/// Column holding the row's base (low) frequency
const FIELD_FREQ_LOW: usize = 2;

/// Column holding the row's bin width
const FIELD_BIN_WIDTH: usize = 4;

/// The strongest bin found in one scan pass
///
/// Recomputed every scan cycle; a new pass supersedes the old
/// candidate entirely.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakCandidate {
    /// Absolute frequency of the bin, in Hz
    pub frequency_hz: f64,
    /// Power reading for the bin, in dB
    pub level_db: f64,
}

impl PeakCandidate {
    /// The "no usable peak" candidate
    pub fn none() -> Self {
        Self {
            frequency_hz: 0.0,
            level_db: NO_SIGNAL_DB,
        }
    }

    /// True if this peak rises above the no-signal floor
    pub fn is_signal(&self) -> bool {
        self.level_db > NO_SIGNAL_DB
    }
}

/// Select the strongest frequency bin from raw scan rows
///
/// Rows which are too short to carry any readings, or which contain
/// unparseable fields, contribute only the no-signal floor. Ties go to
/// the earliest bin: a later reading replaces the running maximum only
/// when it is strictly greater.
pub fn select_peak<'a, I>(lines: I) -> PeakCandidate
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best = PeakCandidate::none();

    for line in lines {
        let fields: Vec<&str> = line.trim().split(',').collect();
        if fields.len() <= HEADER_FIELDS {
            continue;
        }

        let (Ok(base_hz), Ok(step_hz)) = (
            fields[FIELD_FREQ_LOW].trim().parse::<f64>(),
            fields[FIELD_BIN_WIDTH].trim().parse::<f64>(),
        ) else {
            continue;
        };

        // a row with any malformed reading is discarded whole
        let Some(readings) = fields[HEADER_FIELDS..]
            .iter()
            .map(|field| field.trim().parse::<f64>().ok())
            .collect::<Option<Vec<f64>>>()
        else {
            continue;
        };

        for (bin, level_db) in readings.into_iter().enumerate() {
            if level_db > best.level_db {
                best = PeakCandidate {
                    frequency_hz: base_hz + bin as f64 * step_hz,
                    level_db,
                };
            }
        }
    }

    best
}
