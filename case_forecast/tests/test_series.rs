use case_forecast::features::{feature_names, FeatureSynthesizer, TARGET_COLUMN};
use case_forecast::records::EncounterRecord;
use case_forecast::series::{Period, SeriesBuilder};
use case_forecast::ForecastError;
use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::NamedTempFile;

fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset)
}

#[rstest]
#[case(&[0, 0, 5])]
#[case(&[3, 40, 17, 90])]
#[case(&[12])]
fn test_series_spans_every_day(#[case] offsets: &[i64]) {
    let records: Vec<EncounterRecord> = offsets.iter().map(|&o| day(o).into()).collect();
    let series = SeriesBuilder::new(1.0).build(&records).unwrap();

    let min = *offsets.iter().min().unwrap();
    let max = *offsets.iter().max().unwrap();
    assert_eq!(series.len() as i64, max - min + 1);

    let dates: Vec<NaiveDate> = series.dates().collect();
    assert_eq!(dates.first(), Some(&day(min)));
    assert_eq!(dates.last(), Some(&day(max)));
    assert!(dates.windows(2).all(|w| w[1] - w[0] == Duration::days(1)));
}

#[test]
fn test_mostly_zero_series_noise_stays_in_band() {
    // 80% zero days
    let counts: Vec<f64> = (0..100).map(|t| if t % 5 == 0 { 6.0 } else { 0.0 }).collect();
    let series = SeriesBuilder::new(1.0)
        .with_seed(17)
        .build_from_counts(day(0), &counts)
        .unwrap();

    assert!((series.low_fraction() - 0.8).abs() < 1e-12);
    assert_eq!(series.noise_scale(), 0.1);
    for (value, raw) in series.values().iter().zip(series.raw_counts()) {
        if *raw <= 1.0 {
            assert!((1.0..=1.1).contains(value), "{} out of band", value);
        } else {
            assert_eq!(value, raw);
        }
    }
}

#[test]
fn test_same_seed_same_series() {
    let counts: Vec<f64> = (0..60).map(|t| (t % 3) as f64).collect();
    let a = SeriesBuilder::new(1.0).with_seed(5).build_from_counts(day(0), &counts).unwrap();
    let b = SeriesBuilder::new(1.0).with_seed(5).build_from_counts(day(0), &counts).unwrap();
    let c = SeriesBuilder::new(1.0).with_seed(6).build_from_counts(day(0), &counts).unwrap();
    assert_eq!(a, b);
    assert_ne!(a.values(), c.values());
}

#[test]
fn test_no_dates_is_a_data_error() {
    let records = vec![EncounterRecord::new(""), EncounterRecord::new("31/31/2020")];
    let err = SeriesBuilder::new(1.0).build(&records).unwrap_err();
    assert!(matches!(err, ForecastError::DataError(_)));
}

#[test]
fn test_periods_tag_by_date_range() {
    let counts = vec![2.0; 10];
    let series = SeriesBuilder::new(1.0).build_from_counts(day(0), &counts).unwrap();
    let periods = vec![
        Period::new("baseline", day(0), day(3)),
        Period::new("outbreak", day(3), day(6)),
    ];

    let tags = series.tag_periods(&periods);
    assert_eq!(tags[0].as_deref(), Some("baseline"));
    assert_eq!(tags[3].as_deref(), Some("baseline"));
    assert_eq!(tags[4].as_deref(), Some("outbreak"));
    assert_eq!(tags[9], None);
}

#[test]
fn test_feature_columns_are_stable() {
    let short: Vec<f64> = (0..20).map(|t| t as f64).collect();
    let long: Vec<f64> = (0..90).map(|t| (t % 9) as f64 + 2.0).collect();
    let builder = SeriesBuilder::new(1.0).with_noise(false);

    let a = FeatureSynthesizer::new()
        .synthesize(&builder.build_from_counts(day(0), &short).unwrap())
        .unwrap();
    let b = FeatureSynthesizer::new()
        .synthesize(&builder.build_from_counts(day(0), &long).unwrap())
        .unwrap();

    assert_eq!(a.column_names(), b.column_names());
    assert_eq!(a.column_names().to_vec(), feature_names());
    assert_eq!(a.column_names()[a.target_index()], TARGET_COLUMN);
    assert_eq!(a.n_rows(), 20);
    assert_eq!(b.n_rows(), 90);

    for name in b.column_names() {
        let column = b.column(name).unwrap();
        assert!(column.iter().all(|v| v.is_finite()), "{} has non-finite values", name);
    }
    let rsi = a.column("rsi_14").unwrap();
    assert_eq!(rsi[0], 50.0);
}

#[test]
fn test_feature_frame_csv_export() {
    let counts: Vec<f64> = (0..40).map(|t| (t % 7) as f64 + 1.5).collect();
    let series = SeriesBuilder::new(1.0).build_from_counts(day(0), &counts).unwrap();
    let frame = FeatureSynthesizer::new().synthesize(&series).unwrap();

    let df = frame.to_dataframe().unwrap();
    assert_eq!(df.height(), 40);
    assert_eq!(df.width(), frame.n_columns() + 1);

    let file = NamedTempFile::new().unwrap();
    frame.write_csv(file.path()).unwrap();
    let written = std::fs::read_to_string(file.path()).unwrap();
    let header = written.lines().next().unwrap();
    assert!(header.starts_with("date,cases,"));
    assert_eq!(written.lines().count(), 41);
}
