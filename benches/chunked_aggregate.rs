use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use agristat::config::{InputConfig, PipelineConfig};
use agristat::metrics::Domain;
use agristat::pipeline::Pipeline;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use tempfile::TempDir;

const STATES: [&str; 6] = ["Assam", "Bihar", "Goa", "Kerala", "Punjab", "Sikkim"];

fn generate_land(rows: usize) -> (TempDir, PathBuf) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let csv_path = temp_dir.path().join("land.csv");
    let mut file = File::create(&csv_path).expect("create csv");
    writeln!(
        file,
        "State,District,2017_2018__forests,2018_2019__forests,2018_2019__net_area_sown,2019_2020__fallow_land_total"
    )
    .expect("header");
    for i in 0..rows {
        let state = STATES[i % STATES.len()];
        writeln!(
            file,
            "{state},D{i},{},{}.5,{},{}",
            i % 97,
            i % 13,
            (i * 7) % 101,
            if i % 11 == 0 { "NA".to_string() } else { (i % 5).to_string() }
        )
        .expect("row");
    }
    (temp_dir, csv_path)
}

fn bench_chunked_aggregate(c: &mut Criterion) {
    let (_dir, land) = generate_land(20_000);
    let mut group = c.benchmark_group("aggregate_land");
    for chunk_size in [50usize, 1_000, 20_000] {
        let pipeline = Pipeline::new(PipelineConfig {
            land: InputConfig::at(&land),
            chunk_size,
            ..PipelineConfig::default()
        });
        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &pipeline,
            |b, pipeline| {
                b.iter(|| {
                    pipeline
                        .process_domain(Domain::Land)
                        .expect("aggregate land")
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_chunked_aggregate);
criterion_main!(benches);
