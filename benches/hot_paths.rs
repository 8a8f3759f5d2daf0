use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::DVec2;
use mapframe::config::RenderConfig;
use mapframe::geo::GeoExtent;
use mapframe::map::labels::{LabelLayer, LabelSymbolizer};
use mapframe::map::symbology::{Symbolizer, Symbology};
use mapframe::map::{Feature, FeatureLayer, Geometry, LayerStack, MapFrame, NullHost, PixelRect, Transform};
use mapframe::raster::Color;

const VIEW: (i32, i32) = (400, 200);

/// Deterministic scatter over the world
fn scatter(n: usize) -> Vec<DVec2> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };
    (0..n)
        .map(|_| DVec2::new(next() * 360.0 - 180.0, next() * 180.0 - 90.0))
        .collect()
}

fn city_layer(n: usize) -> FeatureLayer {
    let features = scatter(n)
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            Feature::new(i as u64, Geometry::point(p.x, p.y))
                .with("name", format!("City{}", i))
                .with("pop", (i % 1000) as f64)
        })
        .collect();
    let mut labels = LabelSymbolizer::new("[name]");
    labels.font_size = 4.0;
    labels.priority_field = Some("pop".to_string());
    FeatureLayer::new("cities", features, Symbology::single(Symbolizer::point(Color::WHITE, 1.0)))
        .with_labels(LabelLayer::single(labels))
}

fn frame_with(layer: FeatureLayer, config: RenderConfig) -> MapFrame {
    let mut stack = LayerStack::new();
    stack.push(layer);
    MapFrame::new(stack.shared(), VIEW.0, VIEW.1, config)
}

fn bench_transform(c: &mut Criterion) {
    let t = Transform::new(GeoExtent::world(), PixelRect::sized(VIEW.0, VIEW.1)).unwrap();
    let points = scatter(100_000);
    c.bench_function("transform_to_pixel_100k", |b| {
        b.iter(|| {
            let mut acc = DVec2::ZERO;
            for p in &points {
                acc += t.to_pixel(black_box(*p));
            }
            acc
        })
    });
}

fn bench_render(c: &mut Criterion) {
    let mut unlabelled = city_layer(50_000);
    unlabelled.labels = None;
    let mut frame = frame_with(unlabelled, RenderConfig { feature_chunk_size: 5_000, ..RenderConfig::default() });
    c.bench_function("chunked_full_redraw_50k_points", |b| {
        b.iter(|| {
            frame.invalidate();
            black_box(frame.render(&mut NullHost))
        })
    });

    let mut frame = frame_with(city_layer(5_000), RenderConfig::default());
    c.bench_function("label_placement_5k", |b| {
        b.iter(|| {
            frame.invalidate();
            black_box(frame.render(&mut NullHost))
        })
    });

    let mut frame = frame_with(city_layer(20_000), RenderConfig::default());
    frame.render(&mut NullHost);
    let mut flip = 1;
    c.bench_function("extend_buffer_pan_20k", |b| {
        b.iter(|| {
            flip = -flip;
            frame.pan_pixels(8 * flip, 0);
            black_box(frame.render(&mut NullHost))
        })
    });
}

criterion_group!(benches, bench_transform, bench_render);
criterion_main!(benches);
