use criterion::{black_box, criterion_group, criterion_main, Criterion};

use flight_sync::render::{FrameCompositor, TextRenderer};
use flight_sync::{config::RenderConfig, plan, resample, TelemetryLoader, TimeSeriesStore};

/// Five minutes of a 100Hz log
fn flight_log() -> TimeSeriesStore {
    let mut csv = String::from(
        "elapsed_time,timestamp,pos_x,pos_y,roll_ref_deg,pitch_ref_deg,pid_x_p,pid_x_i,pid_x_d,marker_count\n",
    );
    for i in 0..30_000 {
        let t = i as f64 * 0.01;
        csv.push_str(&format!(
            "{t},{i},{},{},{},{},{},{},{},{}\n",
            t.sin(),
            t.cos(),
            (t * 0.3).sin() * 4.0,
            (t * 0.2).cos() * 4.0,
            (t * 2.0).sin() * 0.05,
            t * 1e-4,
            (t * 5.0).cos() * 0.02,
            i / 700 % 5
        ));
    }
    TelemetryLoader::default()
        .load_from_reader(csv.as_bytes(), "bench.csv")
        .expect("valid log")
}

fn bench_resample(c: &mut Criterion) {
    let store = flight_log();
    let plan = plan(store.duration(), 30.0, 9_000, 30.0).expect("valid plan");

    c.bench_function("resample_5min_100hz_to_30fps", |b| {
        b.iter(|| resample(black_box(&store), black_box(&plan)).expect("resample"))
    });
}

fn bench_compose(c: &mut Criterion) {
    let store = flight_log();
    let plan = plan(store.duration(), 30.0, 9_000, 30.0).expect("valid plan");
    let series = resample(&store, &plan).expect("resample").series;
    let compositor = FrameCompositor::new(&RenderConfig::default(), (1280, 720), TextRenderer::without_font());

    c.bench_function("compose_720p_frame", |b| {
        b.iter(|| compositor.compose_at(black_box(&series), 4_500, None))
    });
}

criterion_group!(benches, bench_resample, bench_compose);
criterion_main!(benches);
