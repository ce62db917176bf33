// Windowing tests over a realistic block sequence.
//
// Blocks are produced by the segmenter from a generated document, then the
// virtualizer is driven through scrolling and measurement the way a host
// would drive it.

use vellum_editor_core::{RenderPlan, Virtualizer, VirtualizerOptions, segment};

const VIEWPORT: f64 = 600.0;

fn generated_document(blocks: usize) -> String {
    (0..blocks)
        .map(|i| match i % 4 {
            0 => format!("<h2>Section {i}</h2>"),
            1 => format!("<p>Paragraph {i} with <b>inline</b> markup.</p>"),
            2 => format!("<ul><li>item {i}</li></ul>"),
            _ => format!("<blockquote><p>quote {i}</p></blockquote>"),
        })
        .collect()
}

fn engine(count: usize) -> Virtualizer {
    let mut v = Virtualizer::new(VirtualizerOptions {
        count,
        ..Default::default()
    });
    v.set_viewport_size(VIEWPORT);
    v
}

/// Deterministic "real" heights between 20 and 139 px.
fn real_height(index: usize) -> f64 {
    20.0 + ((index * 37) % 120) as f64
}

#[test]
fn ten_thousand_blocks_window_versus_full() {
    let blocks = segment(&generated_document(10_000));
    assert_eq!(blocks.len(), 10_000);

    let mut v = engine(blocks.len());
    let top = v.virtual_items();
    assert_eq!(top.len(), 17);

    let mid = v.total_size() / 2.0;
    v.set_scroll_offset(mid);
    assert_eq!(v.virtual_items().len(), 22);

    v.set_enabled(false);
    let plan = v.plan();
    assert!(matches!(plan, RenderPlan::Full { count: 10_000 }));
    assert_eq!(plan.indices().len(), blocks.len());
}

#[test]
fn rendered_range_covers_viewport_at_every_offset() {
    let mut v = engine(2_000);
    for i in 0..2_000 {
        v.measure(i, real_height(i));
    }
    let total = v.total_size();
    let min_size = (0..2_000).map(real_height).fold(f64::INFINITY, f64::min);
    let bound = (VIEWPORT / min_size).ceil() as usize + 1 + 2 * v.options().overscan;

    let mut offset = 0.0;
    while offset <= total - VIEWPORT {
        v.set_scroll_offset(offset);
        let items = v.virtual_items();
        let first = items.first().expect("window is never empty");
        let last = items.last().expect("window is never empty");

        assert!(first.start <= offset, "gap above viewport at {offset}");
        assert!(last.end >= offset + VIEWPORT, "gap below viewport at {offset}");
        assert!(items.len() <= bound, "{} items at {offset}", items.len());
        assert!(items.windows(2).all(|w| w[0].end == w[1].start));

        offset += 97.0;
    }
}

#[test]
fn measurement_converges_in_bounded_passes() {
    let mut v = engine(500);
    v.set_scroll_offset(3_000.0);

    let mut passes = 0;
    while !v.is_converged() {
        passes += 1;
        assert!(passes <= 10, "layout did not settle");
        let indices: Vec<_> = v.virtual_items().iter().map(|i| i.index).collect();
        for index in indices {
            v.measure(index, real_height(index));
        }
    }

    let expected: f64 = (0..500)
        .map(|i| if v.is_measured(i) { real_height(i) } else { 50.0 })
        .sum();
    assert!((v.total_size() - expected).abs() < 1e-6);
}

#[test]
fn total_size_matches_cumulative_offsets() {
    let mut v = engine(100);
    for i in (0..100).step_by(3) {
        v.measure(i, real_height(i));
    }
    let last_start = v.start_of(99).unwrap();
    assert_eq!(v.total_size(), last_start + v.size_of(99));
}
