use std::fs;
use std::hint::black_box;
use std::path::Path;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use gitex::config::AnalyzerConfig;
use gitex::extraction::{analyze, scan_directory};
use gitex::slice::resolve_slice;
use tempfile::TempDir;

fn generate_project(root: &Path, modules: usize) {
    let pkg = root.join("pkg");
    fs::create_dir_all(&pkg).unwrap();
    fs::write(pkg.join("__init__.py"), "").unwrap();

    for i in 0..modules {
        let next = (i + 1) % modules;
        let source = format!(
            "import os\nfrom pkg.mod{next} import Handler{next}, run{next}\n\n\
             class Handler{i}(Handler{next}):\n    def handle(self):\n        return self.finish()\n\n    def finish(self):\n        return os.sep\n\n\
             def run{i}():\n    return run{next}()\n"
        );
        fs::write(pkg.join(format!("mod{i}.py")), source).unwrap();
    }
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for modules in [10, 100] {
        let temp_dir = TempDir::new().unwrap();
        generate_project(temp_dir.path(), modules);
        let config = AnalyzerConfig::default();
        let files = scan_directory(temp_dir.path(), &config);

        group.bench_with_input(BenchmarkId::from_parameter(modules), &files, |b, files| {
            b.iter(|| analyze(black_box(temp_dir.path()), files, &config).unwrap());
        });
    }
    group.finish();
}

fn bench_slice(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    generate_project(&root, 100);
    let start = root.join("pkg").join("mod0.py");
    let config = AnalyzerConfig::default();

    c.bench_function("slice_ring_100", |b| {
        b.iter(|| resolve_slice(&root, black_box(&start), "run0", &config).unwrap());
    });
}

criterion_group!(benches, bench_analysis, bench_slice);
criterion_main!(benches);
