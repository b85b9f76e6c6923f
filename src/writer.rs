use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::debug;

use crate::error::ReadError;
use crate::types::{RawRecording, SignalParam};
use crate::utils::{fixed_field, format_number_field};
use crate::EDF_TIME_DIMENSION;

/// Bytes reserved per record for the timekeeping annotation signal.
const ANNOTATION_BYTES: usize = 120;

/// Sequential EDF+C writer.
///
/// Signals are declared up front, then data is written one data record at a
/// time. The header is emitted with the first record and the record count is
/// patched in by [`EdfWriter::finalize`].
///
/// ```no_run
/// use eegscreen::{EdfWriter, SignalParam};
///
/// let mut writer = EdfWriter::create("out.edf")?;
/// writer.add_signal(SignalParam::eeg("Fp1", 250, 500.0))?;
/// writer.write_record(&[vec![0.0; 250]])?;
/// writer.finalize()?;
/// # Ok::<(), eegscreen::ReadError>(())
/// ```
pub struct EdfWriter {
    file: BufWriter<File>,
    signals: Vec<SignalParam>,
    start: NaiveDateTime,
    datarecord_duration: i64,
    records_written: usize,
    header_written: bool,
    patient: String,
    recording: String,
}

impl EdfWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let file = File::create(&path).map_err(|source| ReadError::Open {
            path: path.as_ref().display().to_string(),
            source,
        })?;

        let start = NaiveDate::from_ymd_opt(1985, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(NaiveDateTime::MIN);

        Ok(EdfWriter {
            file: BufWriter::new(file),
            signals: Vec::new(),
            start,
            datarecord_duration: EDF_TIME_DIMENSION,
            records_written: 0,
            header_written: false,
            patient: "X X X X".to_string(),
            recording: "Startdate X X X X".to_string(),
        })
    }

    pub fn add_signal(&mut self, signal: SignalParam) -> Result<(), ReadError> {
        self.ensure_header_open("add signal")?;
        if signal.physical_min == signal.physical_max {
            return Err(ReadError::PhysicalMinEqualsMax(signal.label));
        }
        if signal.digital_min == signal.digital_max {
            return Err(ReadError::DigitalMinEqualsMax(signal.label));
        }
        if signal.digital_min > signal.digital_max {
            return Err(ReadError::InvalidHeader(format!(
                "signal '{}': digital min {} above digital max {}",
                signal.label, signal.digital_min, signal.digital_max
            )));
        }
        if signal.digital_min < i16::MIN as i32 || signal.digital_max > i16::MAX as i32 {
            return Err(ReadError::InvalidHeader(format!(
                "signal '{}': digital range exceeds 16 bits",
                signal.label
            )));
        }
        // physical limits must fit their 8-character header fields
        format_number_field(signal.physical_min)?;
        format_number_field(signal.physical_max)?;
        if signal.samples_per_record < 1 {
            return Err(ReadError::InvalidHeader(format!(
                "signal '{}' needs at least one sample per record",
                signal.label
            )));
        }
        self.signals.push(signal);
        Ok(())
    }

    pub fn set_start(&mut self, start: NaiveDateTime) -> Result<(), ReadError> {
        self.ensure_header_open("set start time")?;
        self.start = start;
        Ok(())
    }

    pub fn set_patient(&mut self, patient: &str) -> Result<(), ReadError> {
        self.ensure_header_open("set patient")?;
        self.patient = patient.to_string();
        Ok(())
    }

    pub fn set_datarecord_duration(&mut self, seconds: f64) -> Result<(), ReadError> {
        self.ensure_header_open("set record duration")?;
        if !(seconds > 0.0 && seconds <= 60.0) {
            return Err(ReadError::InvalidHeader(format!(
                "data record duration {} s out of range",
                seconds
            )));
        }
        self.datarecord_duration = (seconds * EDF_TIME_DIMENSION as f64).round() as i64;
        Ok(())
    }

    fn ensure_header_open(&self, action: &str) -> Result<(), ReadError> {
        if self.header_written {
            return Err(ReadError::InvalidHeader(format!(
                "cannot {} after writing data",
                action
            )));
        }
        Ok(())
    }

    /// Writes one data record; `samples[i]` must hold exactly
    /// `samples_per_record` physical values for signal `i`.
    pub fn write_record(&mut self, samples: &[Vec<f64>]) -> Result<(), ReadError> {
        if samples.len() != self.signals.len() {
            return Err(ReadError::InvalidHeader(format!(
                "record has {} signals, writer declares {}",
                samples.len(),
                self.signals.len()
            )));
        }
        for (signal, data) in self.signals.iter().zip(samples) {
            if data.len() != signal.samples_per_record as usize {
                return Err(ReadError::InvalidHeader(format!(
                    "signal '{}' expects {} samples per record, got {}",
                    signal.label,
                    signal.samples_per_record,
                    data.len()
                )));
            }
        }

        if !self.header_written {
            self.write_header()?;
        }

        for (signal, data) in self.signals.iter().zip(samples) {
            for &physical in data {
                let digital = signal.to_digital(physical) as i16;
                self.file.write_all(&digital.to_le_bytes())?;
            }
        }

        let tal = self.timekeeping_tal(self.records_written);
        self.file.write_all(&tal)?;

        self.records_written += 1;
        Ok(())
    }

    /// Flushes the file and patches the data record count into the header.
    pub fn finalize(mut self) -> Result<(), ReadError> {
        if !self.header_written {
            self.write_header()?;
        }
        self.file.flush()?;

        let mut file = self
            .file
            .into_inner()
            .map_err(|e| ReadError::Io(e.into_error()))?;
        file.seek(SeekFrom::Start(236))?;
        file.write_all(&fixed_field(&self.records_written.to_string(), 8))?;
        file.flush()?;

        debug!("wrote {} data records", self.records_written);
        Ok(())
    }

    /// "+<onset>\x14\x14\0" padded with zeros to the annotation signal size.
    fn timekeeping_tal(&self, record_index: usize) -> Vec<u8> {
        let onset = record_index as f64 * self.datarecord_duration as f64 / EDF_TIME_DIMENSION as f64;
        let onset_str = if onset.fract() == 0.0 {
            format!("{}", onset as i64)
        } else {
            format!("{:.6}", onset)
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        };

        let mut tal = Vec::with_capacity(ANNOTATION_BYTES);
        tal.push(b'+');
        tal.extend_from_slice(onset_str.as_bytes());
        tal.extend_from_slice(&[0x14, 0x14, 0x00]);
        tal.resize(ANNOTATION_BYTES, 0);
        tal
    }

    fn write_header(&mut self) -> Result<(), ReadError> {
        let annotation = SignalParam {
            label: "EDF Annotations".to_string(),
            physical_max: 1.0,
            physical_min: -1.0,
            digital_max: 32767,
            digital_min: -32768,
            samples_per_record: (ANNOTATION_BYTES / 2) as i32,
            physical_dimension: String::new(),
            prefilter: String::new(),
            transducer: String::new(),
        };
        let mut all_signals: Vec<&SignalParam> = self.signals.iter().collect();
        all_signals.push(&annotation);

        let total_signals = all_signals.len();
        let duration_seconds = self.datarecord_duration as f64 / EDF_TIME_DIMENSION as f64;

        let mut main_header = Vec::with_capacity(256);
        main_header.extend(fixed_field("0", 8));
        main_header.extend(fixed_field(&self.patient, 80));
        main_header.extend(fixed_field(&self.recording, 80));
        main_header.extend(fixed_field(
            &format!(
                "{:02}.{:02}.{:02}",
                self.start.day(),
                self.start.month(),
                self.start.year() % 100
            ),
            8,
        ));
        main_header.extend(fixed_field(
            &format!(
                "{:02}.{:02}.{:02}",
                self.start.hour(),
                self.start.minute(),
                self.start.second()
            ),
            8,
        ));
        main_header.extend(fixed_field(&((total_signals + 1) * 256).to_string(), 8));
        main_header.extend(fixed_field("EDF+C", 44));
        // patched by finalize
        main_header.extend(fixed_field("-1", 8));
        main_header.extend(fixed_field(&format_number_field(duration_seconds)?, 8));
        main_header.extend(fixed_field(&total_signals.to_string(), 4));
        self.file.write_all(&main_header)?;

        // each field is written for all signals before the next field
        let text_fields: [(fn(&SignalParam) -> String, usize); 3] = [
            (|s| s.label.clone(), 16),
            (|s| s.transducer.clone(), 80),
            (|s| s.physical_dimension.clone(), 8),
        ];
        for (get, width) in text_fields {
            for signal in &all_signals {
                self.file.write_all(&fixed_field(&get(signal), width))?;
            }
        }

        let numeric_fields: [fn(&SignalParam) -> f64; 4] = [
            |s| s.physical_min,
            |s| s.physical_max,
            |s| s.digital_min as f64,
            |s| s.digital_max as f64,
        ];
        for get in numeric_fields {
            for signal in &all_signals {
                self.file
                    .write_all(&fixed_field(&format_number_field(get(signal))?, 8))?;
            }
        }

        for signal in &all_signals {
            self.file.write_all(&fixed_field(&signal.prefilter, 80))?;
        }
        for signal in &all_signals {
            self.file
                .write_all(&fixed_field(&signal.samples_per_record.to_string(), 8))?;
        }
        for _ in &all_signals {
            self.file.write_all(&[b' '; 32])?;
        }

        self.header_written = true;
        Ok(())
    }
}

/// Writes `recording` as EDF+C using one-second data records.
///
/// Samples are quantised to 16 bits over each channel's own range. Trailing
/// samples that do not fill a whole record are dropped, so the sample rate
/// must be a whole number of Hz.
pub fn write_recording<P: AsRef<Path>>(path: P, recording: &RawRecording) -> Result<(), ReadError> {
    let rate = recording.sample_rate();
    if rate.fract() != 0.0 {
        return Err(ReadError::InvalidHeader(format!(
            "sample rate {} Hz is not a whole number",
            rate
        )));
    }
    let per_record = rate as usize;

    let mut writer = EdfWriter::create(path)?;
    for (label, data) in recording.labels().iter().zip(recording.channels()) {
        let (min, max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let (min, max) = if min.is_finite() && max > min {
            (min, max)
        } else {
            let centre = if min.is_finite() { min } else { 0.0 };
            (centre - 1.0, centre + 1.0)
        };
        writer.add_signal(SignalParam {
            physical_min: min,
            physical_max: max,
            ..SignalParam::eeg(label, per_record as i32, 1.0)
        })?;
    }

    let records = recording.sample_count() / per_record;
    for r in 0..records {
        let range = r * per_record..(r + 1) * per_record;
        let record: Vec<Vec<f64>> = recording
            .channels()
            .iter()
            .map(|ch| ch[range.clone()].to_vec())
            .collect();
        writer.write_record(&record)?;
    }

    writer.finalize()
}
