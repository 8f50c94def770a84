use membw::kernels::{
    non_temporal_uniform_write, partition, strided_reduction_read, uniform_write, StorePath,
    NON_TEMPORAL_STORES,
};
use membw_types::ORDINARY_STORES_SUFFIX;
use membw::{run, AlignedBuffer, Error, ResultSink, RunConfig, Sweep, UnrollWidth, WriteVariant};
use std::fs;
use tempfile::TempDir;

fn create_test_config(dir: &TempDir, len: usize, widths: &[usize]) -> RunConfig {
    RunConfig {
        len,
        threads: 3,
        verbosity: 1,
        unroll_widths: widths.iter().filter_map(|&w| UnrollWidth::new(w)).collect(),
        output_dir: dir.path().to_path_buf(),
    }
}

#[test]
fn test_integration_full_sweep() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, 10_001, &[1, 2, 4, 8, 16]);

    run(&config).unwrap();

    let writes = fs::read_to_string(temp_dir.path().join("write_results.csv")).unwrap();
    let labels: Vec<&str> = writes
        .lines()
        .map(|row| row.split(',').next().unwrap())
        .collect();
    for (label, variant) in labels.iter().zip(WriteVariant::ALL) {
        if variant.non_temporal() && !NON_TEMPORAL_STORES {
            assert_eq!(*label, format!("{}{}", variant.label(), ORDINARY_STORES_SUFFIX));
        } else {
            assert_eq!(*label, variant.label());
        }
    }
    assert_eq!(labels.len(), WriteVariant::ALL.len());
    for row in writes.lines() {
        let fields: Vec<&str> = row.rsplitn(2, ',').collect();
        let bandwidth: f64 = fields[0].parse().unwrap();
        assert!(bandwidth > 0.0);
        assert!(fields[1].ends_with(",3"));
    }

    let reads = fs::read_to_string(temp_dir.path().join("read_results.csv")).unwrap();
    assert_eq!(reads.lines().count(), 5);
}

#[test]
fn test_integration_repeated_runs_accumulate() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, 257, &[4, 3]);

    run(&config).unwrap();
    run(&config).unwrap();

    let writes = fs::read_to_string(temp_dir.path().join("write_results.csv")).unwrap();
    assert_eq!(writes.lines().count(), 6);

    let reads = fs::read_to_string(temp_dir.path().join("read_results.csv")).unwrap();
    let widths: Vec<&str> = reads
        .lines()
        .map(|row| row.split(',').next().unwrap())
        .collect();
    assert_eq!(widths, vec!["4", "3", "4", "3"]);
}

#[test]
fn test_integration_missing_output_dir() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_test_config(&temp_dir, 64, &[1]);
    config.output_dir = temp_dir.path().join("missing");

    match run(&config) {
        Err(Error::SinkOpen { path, .. }) => {
            assert!(path.ends_with("write_results.csv"));
        }
        other => panic!("expected sink open error, got {:?}", other),
    }
    assert!(!config.output_dir.exists());
}

#[test]
fn test_integration_sweep_on_caller_buffer() {
    let temp_dir = TempDir::new().unwrap();
    let config = create_test_config(&temp_dir, 4 * 512 + 3, &[8]);
    let sweep = Sweep::new(&config).unwrap();
    let mut buffer = AlignedBuffer::new(config.len).unwrap();
    let mut sink = ResultSink::open(temp_dir.path()).unwrap();

    sweep.run(&mut buffer, &mut sink).unwrap();

    assert!(buffer.iter().all(|&x| x == 1.0));
    let width = UnrollWidth::new(8).unwrap();
    assert_eq!(strided_reduction_read(&buffer, width), config.len as f64);
}

#[test]
fn test_integration_kernel_scenarios() {
    let four = UnrollWidth::new(4).unwrap();

    let mut buffer = AlignedBuffer::new(16).unwrap();
    uniform_write(&mut buffer, 1.0);
    assert_eq!(partition(16, 4).remainder.len(), 0);
    assert_eq!(strided_reduction_read(&buffer, four), 16.0);

    let mut buffer = AlignedBuffer::new(17).unwrap();
    let path = non_temporal_uniform_write(&mut buffer, 1.0);
    assert_eq!(path == StorePath::Streaming, NON_TEMPORAL_STORES);
    assert_eq!(partition(17, 4).remainder, 16..17);
    assert_eq!(strided_reduction_read(&buffer, four), 17.0);
}
