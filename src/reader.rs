use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};

use crate::error::ReadError;
use crate::types::{EdfHeader, FileType, RawRecording, SignalParam};
use crate::utils::{parse_edf_time, parse_float_field, parse_int_field};
use crate::EDF_MAX_SIGNALS;

const ANNOTATION_LABEL: &str = "EDF Annotations";

/// Reader for EDF and continuous EDF+ files.
///
/// The underlying handle is owned by the reader and released when it is
/// dropped, including on any early return with an error.
///
/// ```no_run
/// use eegscreen::EdfReader;
///
/// let mut reader = EdfReader::open("recording.edf")?;
/// println!("{} signals", reader.header().signals.len());
/// let recording = reader.read_recording()?;
/// println!("{:.1} s at {} Hz", recording.duration_seconds(), recording.sample_rate());
/// # Ok::<(), eegscreen::ScreenError>(())
/// ```
pub struct EdfReader<R> {
    source: R,
    header: EdfHeader,
    /// Byte layout of every signal in a data record, annotations included.
    layout: Vec<SignalLayout>,
    header_size: u64,
    record_size: usize,
}

#[derive(Debug, Clone)]
struct SignalLayout {
    /// Byte offset of this signal inside a data record
    buffer_offset: usize,
    samples_per_record: usize,
    /// Index into `EdfHeader::signals`, `None` for annotation signals
    signal_index: Option<usize>,
}

impl EdfReader<BufReader<File>> {
    /// Opens an EDF file from disk and parses its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReadError> {
        let file = File::open(&path).map_err(|source| ReadError::Open {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<'a> EdfReader<Cursor<&'a [u8]>> {
    /// Reads an EDF file held in memory, e.g. an uploaded buffer.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, ReadError> {
        Self::new(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> EdfReader<R> {
    pub fn new(mut source: R) -> Result<Self, ReadError> {
        let (mut header, layout, header_size, record_size) = Self::parse_header(&mut source)?;

        let data_len = source.seek(SeekFrom::End(0))?.saturating_sub(header_size);
        let available = if record_size == 0 {
            0
        } else {
            (data_len / record_size as u64) as i64
        };

        if header.datarecords_in_file < 0 {
            // -1 means the recorder never patched the count
            debug!("record count unknown, using {} records found in data", available);
            header.datarecords_in_file = available;
        } else if header.datarecords_in_file > available {
            return Err(ReadError::Truncated {
                declared: header.datarecords_in_file,
                available,
            });
        }

        Ok(EdfReader {
            source,
            header,
            layout,
            header_size,
            record_size,
        })
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Reads every sample of every ordinary signal in physical units,
    /// one `Vec` per entry of `header().signals`.
    pub fn read_all_physical(&mut self) -> Result<Vec<Vec<f64>>, ReadError> {
        let records = self.header.datarecords_in_file as usize;
        // sized only after new() checked that `records` full records are present
        let mut out: Vec<Vec<f64>> = self
            .header
            .signals
            .iter()
            .map(|s| Vec::with_capacity(s.samples_per_record as usize * records))
            .collect();
        if records == 0 {
            return Ok(out);
        }

        self.source.seek(SeekFrom::Start(self.header_size))?;
        let mut record = vec![0u8; self.record_size];

        for _ in 0..records {
            self.source.read_exact(&mut record)?;

            for layout in &self.layout {
                let Some(index) = layout.signal_index else {
                    continue;
                };
                let param = &self.header.signals[index];
                let start = layout.buffer_offset;
                let end = start + layout.samples_per_record * 2;

                out[index].extend(record[start..end].chunks_exact(2).map(|pair| {
                    let digital = i16::from_le_bytes([pair[0], pair[1]]) as i32;
                    param.to_physical(digital.max(param.digital_min).min(param.digital_max))
                }));
            }
        }

        Ok(out)
    }

    /// Decodes the whole file into a [`RawRecording`].
    ///
    /// Channels sampled at a different rate than the first ordinary signal
    /// are left out of the recording (with a warning), since a recording
    /// carries a single sample rate.
    pub fn read_recording(&mut self) -> crate::Result<RawRecording> {
        let reference_rate = self.header.sample_rate(0).ok_or_else(|| {
            ReadError::InvalidHeader("data record duration must be positive".to_string())
        })?;

        let samples = self.read_all_physical()?;

        let mut labels = Vec::new();
        let mut channels = Vec::new();
        for (index, data) in samples.into_iter().enumerate() {
            let label = &self.header.signals[index].label;
            let rate = self.header.sample_rate(index).unwrap_or(0.0);
            if (rate - reference_rate).abs() > 1e-9 {
                warn!(
                    "skipping channel '{}': sampled at {} Hz, recording uses {} Hz",
                    label, rate, reference_rate
                );
                continue;
            }
            labels.push(label.clone());
            channels.push(data);
        }

        debug!(
            "decoded {} channels x {} samples at {} Hz",
            channels.len(),
            channels.first().map_or(0, Vec::len),
            reference_rate
        );
        RawRecording::new(labels, reference_rate, channels)
    }

    fn parse_header(reader: &mut R) -> Result<(EdfHeader, Vec<SignalLayout>, u64, usize), ReadError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut main_header = [0u8; 256];
        read_header_bytes(reader, &mut main_header)?;

        let version = String::from_utf8_lossy(&main_header[0..8]);
        if version.trim() != "0" {
            return Err(ReadError::NotEdf(format!("unexpected version field '{}'", version.trim())));
        }

        let signals_str = String::from_utf8_lossy(&main_header[252..256]);
        let total_signal_count = parse_int_field(&signals_str, "number of signals")?;
        if total_signal_count < 1 || total_signal_count > EDF_MAX_SIGNALS as i64 {
            return Err(ReadError::InvalidSignalCount(total_signal_count));
        }
        let total_signal_count = total_signal_count as usize;

        let header_size_str = String::from_utf8_lossy(&main_header[184..192]);
        let expected_header_size = (total_signal_count as i64 + 1) * 256;
        let declared_header_size = parse_int_field(&header_size_str, "header size")?;
        if declared_header_size != expected_header_size {
            return Err(ReadError::InvalidHeader(format!(
                "header size {} does not match {} signals",
                declared_header_size, total_signal_count
            )));
        }

        let reserved = String::from_utf8_lossy(&main_header[192..236]);
        let file_type = if reserved.starts_with("EDF+D") {
            return Err(ReadError::Discontinuous);
        } else if reserved.starts_with("EDF+C") {
            FileType::EdfPlusContinuous
        } else {
            FileType::Edf
        };

        let patient = String::from_utf8_lossy(&main_header[8..88]).trim().to_string();
        let recording = String::from_utf8_lossy(&main_header[88..168]).trim().to_string();

        let date_str = String::from_utf8_lossy(&main_header[168..176]);
        let time_str = String::from_utf8_lossy(&main_header[176..184]);
        let start = parse_datetime(&date_str, &time_str);
        if start.is_none() {
            warn!("unparseable start date/time '{}' '{}'", date_str.trim(), time_str.trim());
        }

        let datarecords_str = String::from_utf8_lossy(&main_header[236..244]);
        let datarecords_in_file = parse_int_field(&datarecords_str, "number of data records")?;
        if datarecords_in_file < -1 {
            return Err(ReadError::InvalidHeader(format!(
                "negative number of data records: {}",
                datarecords_in_file
            )));
        }

        let duration_str = String::from_utf8_lossy(&main_header[244..252]);
        let datarecord_duration = parse_edf_time(&duration_str)?;
        if datarecord_duration < 0 {
            return Err(ReadError::InvalidHeader("negative data record duration".to_string()));
        }

        let mut signal_header = vec![0u8; total_signal_count * 256];
        read_header_bytes(reader, &mut signal_header)?;
        let (signals, layout, record_size) = parse_signals(&signal_header, total_signal_count)?;

        if signals.is_empty() {
            return Err(ReadError::NoSignals);
        }
        if datarecord_duration == 0 {
            return Err(ReadError::InvalidHeader(
                "data record duration of 0 carries no sample rate".to_string(),
            ));
        }

        let header = EdfHeader {
            file_type,
            signals,
            start,
            datarecords_in_file,
            datarecord_duration,
            patient,
            recording,
        };

        Ok((header, layout, expected_header_size as u64, record_size))
    }
}

/// Header reads that hit end-of-file mean the file is cut short, not an I/O fault.
fn read_header_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), ReadError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ReadError::InvalidHeader("file ends inside the header".to_string())
        } else {
            ReadError::Io(e)
        }
    })
}

fn parse_signals(
    signal_header: &[u8],
    n: usize,
) -> Result<(Vec<SignalParam>, Vec<SignalLayout>, usize), ReadError> {
    let field = |base: usize, width: usize, i: usize| -> String {
        let start = n * base + i * width;
        String::from_utf8_lossy(&signal_header[start..start + width])
            .trim()
            .to_string()
    };

    let mut signals = Vec::new();
    let mut layout = Vec::with_capacity(n);
    let mut buffer_offset = 0;

    for i in 0..n {
        let label = field(0, 16, i);
        let samples_per_record = parse_int_field(&field(216, 8, i), "samples per record")?;
        if samples_per_record < 1 {
            return Err(ReadError::InvalidHeader(format!(
                "signal '{}' has {} samples per record",
                label, samples_per_record
            )));
        }
        let samples_per_record = samples_per_record as usize;

        let signal_index = if label == ANNOTATION_LABEL {
            None
        } else {
            let physical_min = parse_float_field(&field(104, 8, i), "physical minimum")?;
            let physical_max = parse_float_field(&field(112, 8, i), "physical maximum")?;
            let digital_min = parse_int_field(&field(120, 8, i), "digital minimum")? as i32;
            let digital_max = parse_int_field(&field(128, 8, i), "digital maximum")? as i32;

            if physical_min == physical_max {
                return Err(ReadError::PhysicalMinEqualsMax(label));
            }
            if digital_min == digital_max {
                return Err(ReadError::DigitalMinEqualsMax(label));
            }
            if digital_min > digital_max {
                return Err(ReadError::InvalidHeader(format!(
                    "signal '{}': digital min {} above digital max {}",
                    label, digital_min, digital_max
                )));
            }

            signals.push(SignalParam {
                label,
                physical_max,
                physical_min,
                digital_max,
                digital_min,
                samples_per_record: samples_per_record as i32,
                physical_dimension: field(96, 8, i),
                prefilter: field(136, 80, i),
                transducer: field(16, 80, i),
            });
            Some(signals.len() - 1)
        };

        layout.push(SignalLayout {
            buffer_offset,
            samples_per_record,
            signal_index,
        });

        // 2 bytes per sample
        buffer_offset = samples_per_record
            .checked_mul(2)
            .and_then(|bytes| buffer_offset.checked_add(bytes))
            .ok_or_else(|| ReadError::InvalidHeader("data record size overflows".to_string()))?;
    }

    Ok((signals, layout, buffer_offset))
}

/// Parses "dd.mm.yy" / "hh.mm.ss", with the EDF 1985 year pivot.
fn parse_datetime(date_str: &str, time_str: &str) -> Option<NaiveDateTime> {
    let parts = |s: &str| -> Option<[u32; 3]> {
        let v: Vec<u32> = s.trim().split('.').map(|p| p.trim().parse().ok()).collect::<Option<_>>()?;
        <[u32; 3]>::try_from(v).ok()
    };

    let [day, month, yy] = parts(date_str)?;
    let year = if yy > 84 { 1900 + yy } else { 2000 + yy };
    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;

    let [hour, minute, second] = parts(time_str)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;

    Some(date.and_time(time))
}
