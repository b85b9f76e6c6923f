use chrono::NaiveDate;
use eegscreen::{
    inspect, write_recording, EdfBytesSource, EdfReader, EdfWriter, FileType, RawRecording,
    ReadError, ScreenError, SignalParam, SignalSource,
};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

fn cleanup_test_file(filename: &str) {
    if Path::new(filename).exists() {
        fs::remove_file(filename).ok();
    }
}

fn eeg_like(n: usize, rate: f64, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / rate;
            40.0 * (2.0 * std::f64::consts::PI * 10.0 * t + phase).sin()
                + 15.0 * (2.0 * std::f64::consts::PI * 3.0 * t).cos()
        })
        .collect()
}

/// Two ordinary signals at 250 Hz, ten one-second records.
fn write_two_channel_file(filename: &str) {
    let mut writer = EdfWriter::create(filename).unwrap();
    writer.add_signal(SignalParam::eeg("Fp1", 250, 200.0)).unwrap();
    writer.add_signal(SignalParam::eeg("Fp2", 250, 200.0)).unwrap();
    writer
        .set_start(
            NaiveDate::from_ymd_opt(2023, 5, 14)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
        )
        .unwrap();

    let fp1 = eeg_like(2500, 250.0, 0.0);
    let fp2 = eeg_like(2500, 250.0, 1.0);
    for r in 0..10 {
        let range = r * 250..(r + 1) * 250;
        writer
            .write_record(&[fp1[range.clone()].to_vec(), fp2[range].to_vec()])
            .unwrap();
    }
    writer.finalize().unwrap();
}

fn patch_bytes(filename: &str, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(filename).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn test_header_round_trip() {
    let filename = "test_io_header.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);

    let reader = EdfReader::open(filename).unwrap();
    let header = reader.header();

    assert_eq!(header.file_type, FileType::EdfPlusContinuous);
    // the timekeeping annotation signal is not an ordinary signal
    assert_eq!(header.signals.len(), 2);
    assert_eq!(header.signals[0].label, "Fp1");
    assert_eq!(header.signals[1].label, "Fp2");
    assert_eq!(header.signals[0].physical_dimension, "uV");
    assert_eq!(header.datarecords_in_file, 10);
    assert_eq!(header.datarecord_seconds(), 1.0);
    assert_eq!(header.sample_rate(0), Some(250.0));
    assert_eq!(header.duration_seconds(), 10.0);
    assert_eq!(
        header.start,
        NaiveDate::from_ymd_opt(2023, 5, 14)
            .unwrap()
            .and_hms_opt(10, 30, 0)
    );

    cleanup_test_file(filename);
}

#[test]
fn test_samples_round_trip_within_one_step() {
    let filename = "test_io_samples.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);

    let mut reader = EdfReader::open(filename).unwrap();
    let recording = reader.read_recording().unwrap();

    assert_eq!(recording.labels(), ["Fp1", "Fp2"]);
    assert_eq!(recording.sample_rate(), 250.0);
    assert_eq!(recording.sample_count(), 2500);

    let step = SignalParam::eeg("Fp1", 250, 200.0).bit_value();
    let expected = eeg_like(2500, 250.0, 0.0);
    for (got, want) in recording.channel(0).unwrap().iter().zip(&expected) {
        assert!((got - want).abs() <= step, "{} vs {}", got, want);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_write_recording_round_trip() {
    let filename = "test_io_write_recording.edf";
    cleanup_test_file(filename);

    let original = RawRecording::new(
        vec!["Fp1".into(), "Fp2".into(), "Cz".into()],
        250.0,
        vec![
            eeg_like(2600, 250.0, 0.0),
            eeg_like(2600, 250.0, 0.5),
            vec![3.0; 2600],
        ],
    )
    .unwrap();
    write_recording(filename, &original).unwrap();

    let loaded = EdfReader::open(filename).unwrap().read_recording().unwrap();
    assert_eq!(loaded.labels(), original.labels());
    // 100 trailing samples do not fill a record
    assert_eq!(loaded.sample_count(), 2500);

    for c in 0..2 {
        let data = original.channel(c).unwrap();
        let (lo, hi) = data
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        let step = (hi - lo) / 65535.0;
        for (got, want) in loaded.channel(c).unwrap().iter().zip(data) {
            assert!((got - want).abs() <= step);
        }
    }
    // a flat channel keeps its level
    for v in loaded.channel(2).unwrap() {
        assert!((v - 3.0).abs() < 1e-3);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_write_recording_needs_whole_hz() {
    let filename = "test_io_fractional_rate.edf";
    cleanup_test_file(filename);

    let recording = RawRecording::new(vec!["Fp1".into()], 250.5, vec![vec![0.0; 600]]).unwrap();
    assert!(matches!(
        write_recording(filename, &recording),
        Err(ReadError::InvalidHeader(_))
    ));

    cleanup_test_file(filename);
}

#[test]
fn test_mixed_rate_channel_excluded() {
    let filename = "test_io_mixed_rate.edf";
    cleanup_test_file(filename);

    let mut writer = EdfWriter::create(filename).unwrap();
    writer.add_signal(SignalParam::eeg("Fp1", 250, 200.0)).unwrap();
    writer.add_signal(SignalParam::eeg("Resp", 125, 200.0)).unwrap();
    writer.add_signal(SignalParam::eeg("Fp2", 250, 200.0)).unwrap();
    for _ in 0..4 {
        writer
            .write_record(&[vec![1.0; 250], vec![2.0; 125], vec![-1.0; 250]])
            .unwrap();
    }
    writer.finalize().unwrap();

    let info = inspect(filename).unwrap();
    assert_eq!(info.channel_count, 3);
    assert_eq!(info.sample_rates, vec![250.0, 125.0, 250.0]);

    let recording = EdfReader::open(filename).unwrap().read_recording().unwrap();
    assert_eq!(recording.labels(), ["Fp1", "Fp2"]);
    assert_eq!(recording.sample_count(), 1000);

    cleanup_test_file(filename);
}

#[test]
fn test_inspect_reports_header_summary() {
    let filename = "test_io_inspect.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);

    let info = inspect(filename).unwrap();
    assert_eq!(info.channel_count, 2);
    assert_eq!(info.labels, vec!["Fp1", "Fp2"]);
    assert_eq!(info.sample_rates, vec![250.0, 250.0]);
    assert_eq!(info.duration_seconds, 10.0);
    assert!(info.start.is_some());

    cleanup_test_file(filename);
}

#[test]
fn test_bytes_source_matches_file() {
    let filename = "test_io_bytes.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);

    let bytes = fs::read(filename).unwrap();
    let from_file = EdfReader::open(filename).unwrap().read_recording().unwrap();
    let from_bytes = EdfBytesSource::new(&bytes).load().unwrap();
    assert_eq!(from_file, from_bytes);

    cleanup_test_file(filename);
}

#[test]
fn test_unknown_record_count_resolved_from_data() {
    let filename = "test_io_unknown_count.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, 236, b"-1      ");

    let mut reader = EdfReader::open(filename).unwrap();
    assert_eq!(reader.header().datarecords_in_file, 10);
    assert_eq!(reader.read_recording().unwrap().sample_count(), 2500);

    cleanup_test_file(filename);
}

#[test]
fn test_truncated_file_rejected() {
    let filename = "test_io_truncated.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);

    let len = fs::metadata(filename).unwrap().len();
    let file = OpenOptions::new().write(true).open(filename).unwrap();
    file.set_len(len - 100).unwrap();
    drop(file);

    match EdfReader::open(filename) {
        Err(ReadError::Truncated {
            declared,
            available,
        }) => {
            assert_eq!(declared, 10);
            assert_eq!(available, 9);
        }
        other => panic!("expected truncation error, got {:?}", other.map(|_| ())),
    }

    cleanup_test_file(filename);
}

#[test]
fn test_discontinuous_file_rejected() {
    let filename = "test_io_discontinuous.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, 192, b"EDF+D");

    assert!(matches!(
        EdfReader::open(filename),
        Err(ReadError::Discontinuous)
    ));

    cleanup_test_file(filename);
}

#[test]
fn test_bad_start_date_is_tolerated() {
    let filename = "test_io_bad_date.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, 168, b"xx.yy.zz");

    let mut reader = EdfReader::open(filename).unwrap();
    assert_eq!(reader.header().start, None);
    assert_eq!(reader.read_recording().unwrap().channel_count(), 2);

    cleanup_test_file(filename);
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        EdfReader::open("definitely_not_here.edf"),
        Err(ReadError::Open { .. })
    ));
}

#[test]
fn test_writer_rejects_late_header_changes() {
    let filename = "test_io_late_header.edf";
    cleanup_test_file(filename);

    let mut writer = EdfWriter::create(filename).unwrap();
    writer.add_signal(SignalParam::eeg("Fp1", 10, 100.0)).unwrap();
    assert!(writer.write_record(&[vec![0.0; 9]]).is_err());
    writer.write_record(&[vec![0.0; 10]]).unwrap();
    assert!(writer.add_signal(SignalParam::eeg("Fp2", 10, 100.0)).is_err());
    assert!(writer.set_patient("late").is_err());
    writer.finalize().unwrap();

    assert_eq!(
        EdfReader::open(filename).unwrap().header().datarecords_in_file,
        1
    );

    cleanup_test_file(filename);
}

// Byte offsets inside files from write_two_channel_file: two ordinary signals
// plus the annotation signal, so each signal header field spans 3 entries.
const SIGNALS_IN_FILE: u64 = 3;

fn signal_field_offset(field_base: u64, width: u64, signal: u64) -> u64 {
    256 + SIGNALS_IN_FILE * field_base + signal * width
}

fn expect_read_error(filename: &str) -> ReadError {
    match EdfReader::open(filename) {
        Err(e) => e,
        Ok(_) => panic!("{} should have been rejected", filename),
    }
}

#[test]
fn test_zero_signal_count_rejected() {
    let filename = "test_io_zero_signals.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, 252, b"0   ");

    assert!(matches!(
        expect_read_error(filename),
        ReadError::InvalidSignalCount(0)
    ));

    cleanup_test_file(filename);
}

#[test]
fn test_annotation_only_file_rejected() {
    let filename = "test_io_annotations_only.edf";
    cleanup_test_file(filename);

    let mut writer = EdfWriter::create(filename).unwrap();
    writer.write_record(&[]).unwrap();
    writer.finalize().unwrap();

    assert!(matches!(expect_read_error(filename), ReadError::NoSignals));
    let bytes = fs::read(filename).unwrap();
    assert!(EdfBytesSource::new(&bytes).load().is_err());

    cleanup_test_file(filename);
}

#[test]
fn test_equal_physical_range_rejected() {
    let filename = "test_io_physical_equal.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    // physical max of Fp1 set to its physical min
    patch_bytes(filename, signal_field_offset(112, 8, 0), b"-200    ");

    match expect_read_error(filename) {
        ReadError::PhysicalMinEqualsMax(label) => assert_eq!(label, "Fp1"),
        other => panic!("unexpected error {:?}", other),
    }

    cleanup_test_file(filename);
}

#[test]
fn test_equal_digital_range_rejected() {
    let filename = "test_io_digital_equal.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, signal_field_offset(128, 8, 1), b"-32768  ");

    match expect_read_error(filename) {
        ReadError::DigitalMinEqualsMax(label) => assert_eq!(label, "Fp2"),
        other => panic!("unexpected error {:?}", other),
    }

    cleanup_test_file(filename);
}

#[test]
fn test_inverted_digital_range_rejected() {
    let filename = "test_io_digital_inverted.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, signal_field_offset(120, 8, 0), b"32767   ");
    patch_bytes(filename, signal_field_offset(128, 8, 0), b"-32768  ");

    assert!(matches!(
        expect_read_error(filename),
        ReadError::InvalidHeader(_)
    ));
    let bytes = fs::read(filename).unwrap();
    assert!(matches!(
        EdfBytesSource::new(&bytes).load(),
        Err(ScreenError::SourceRead(ReadError::InvalidHeader(_)))
    ));

    cleanup_test_file(filename);
}

#[test]
fn test_non_ascii_duration_rejected() {
    let filename = "test_io_duration_bytes.edf";
    cleanup_test_file(filename);
    write_two_channel_file(filename);
    patch_bytes(filename, 244, &[b'.', 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

    assert!(matches!(
        expect_read_error(filename),
        ReadError::InvalidHeader(_)
    ));
    let bytes = fs::read(filename).unwrap();
    assert!(matches!(
        EdfReader::from_bytes(&bytes),
        Err(ReadError::InvalidHeader(_))
    ));

    cleanup_test_file(filename);
}

#[test]
fn test_huge_record_without_data_reads_empty() {
    let filename = "test_io_huge_record.edf";

    for record_count in [&b"0       "[..], &b"-1      "[..]] {
        cleanup_test_file(filename);
        write_two_channel_file(filename);
        // a ~200 MB data record declared, but no data follows the header
        patch_bytes(filename, signal_field_offset(216, 8, 0), b"99999999");
        patch_bytes(filename, 236, record_count);
        let file = OpenOptions::new().write(true).open(filename).unwrap();
        file.set_len((SIGNALS_IN_FILE + 1) * 256).unwrap();
        drop(file);

        let mut reader = EdfReader::open(filename).unwrap();
        assert_eq!(reader.header().datarecords_in_file, 0);
        assert!(reader.read_all_physical().unwrap().iter().all(Vec::is_empty));
        let recording = reader.read_recording().unwrap();
        assert_eq!(recording.sample_count(), 0);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_writer_rejects_unrepresentable_signals() {
    let filename = "test_io_writer_ranges.edf";
    cleanup_test_file(filename);

    let mut writer = EdfWriter::create(filename).unwrap();
    let inverted = SignalParam {
        digital_min: 32767,
        digital_max: -32768,
        ..SignalParam::eeg("Fp1", 250, 200.0)
    };
    assert!(matches!(
        writer.add_signal(inverted),
        Err(ReadError::InvalidHeader(_))
    ));

    // the integer part alone needs 9 characters
    let too_wide = SignalParam {
        physical_max: 123_456_789.5,
        ..SignalParam::eeg("Fp1", 250, 200.0)
    };
    assert!(matches!(
        writer.add_signal(too_wide),
        Err(ReadError::InvalidHeader(_))
    ));

    // "-12345679" needs 9 characters with the sign
    writer
        .add_signal(SignalParam {
            physical_min: -12_345_678.9,
            physical_max: 12_345_678.9,
            ..SignalParam::eeg("Fp1", 250, 1.0)
        })
        .unwrap_err();
    writer
        .add_signal(SignalParam {
            physical_min: -1_234_567.25,
            physical_max: 12_345_678.9,
            ..SignalParam::eeg("Fp1", 250, 1.0)
        })
        .unwrap();
    // wide but representable ranges keep their magnitude
    writer.write_record(&[vec![0.0; 250]]).unwrap();
    writer.finalize().unwrap();

    let header = EdfReader::open(filename).unwrap().header().clone();
    assert_eq!(header.signals[0].physical_min, -1_234_567.0);
    assert_eq!(header.signals[0].physical_max, 12_345_679.0);

    cleanup_test_file(filename);
}
