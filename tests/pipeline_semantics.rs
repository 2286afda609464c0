use std::path::{Path, PathBuf};

use lipwave::{
    Canvas, FrameIndex, Fps, InMemorySink, Label, LipwaveError, MappingTable, RenderAssets,
    RenderConfig, RenderThreading, TimedEvent, Timeline, load_image, render_to_sink,
};

fn fixture_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target")
        .join("pipeline_semantics_fixtures")
        .join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_png(dir: &Path, name: &str, w: u32, h: u32, px: [u8; 4]) {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(px));
    img.save(dir.join(name)).unwrap();
}

fn label(c: char) -> Label {
    Label::parse(&c.to_string()).unwrap()
}

fn mouth_table(dir: &Path) -> MappingTable {
    write_png(dir, "mouth_a.png", 4, 4, [255, 0, 0, 255]);
    write_png(dir, "mouth_b.png", 4, 4, [0, 255, 0, 255]);
    std::fs::write(dir.join("lips.txt"), "A,mouth_a.png\nB,mouth_b.png\n").unwrap();
    MappingTable::load(&dir.join("lips.txt")).unwrap()
}

fn ab_timeline() -> Timeline {
    Timeline::new(
        vec![
            TimedEvent {
                start: 0.0,
                label: label('A'),
            },
            TimedEvent {
                start: 1.0,
                label: label('B'),
            },
        ],
        2.0,
    )
    .unwrap()
}

#[test]
fn two_label_render_produces_expected_frames() {
    let dir = fixture_dir("two_label");
    let assets = RenderAssets::prepare(mouth_table(&dir), None, None).unwrap();
    let config = RenderConfig {
        fps: Fps::new(10, 1).unwrap(),
        duration: 2.0,
        lip_timeline: ab_timeline(),
        blink_timeline: None,
    };

    let mut sink = InMemorySink::new();
    let stats = render_to_sink(&config, &assets, &RenderThreading::default(), &mut sink).unwrap();

    assert_eq!(stats.frames_total, 20);
    assert_eq!(sink.frames().len(), 20);
    for (i, (idx, _)) in sink.frames().iter().enumerate() {
        assert_eq!(*idx, FrameIndex(i as u64));
    }

    let a_data = assets
        .mouth
        .resolve(label('A'))
        .unwrap()
        .rgba8_premul
        .as_ref()
        .clone();
    let b_data = assets
        .mouth
        .resolve(label('B'))
        .unwrap()
        .rgba8_premul
        .as_ref()
        .clone();
    for (idx, frame) in sink.frames() {
        if idx.0 < 10 {
            assert_eq!(frame.data, a_data, "frame {} should show mouth A", idx.0);
        } else {
            assert_eq!(frame.data, b_data, "frame {} should show mouth B", idx.0);
        }
    }
}

#[test]
fn label_state_persists_until_next_event() {
    let dir = fixture_dir("persistence");
    let assets = RenderAssets::prepare(mouth_table(&dir), None, None).unwrap();
    let config = RenderConfig {
        fps: Fps::new(10, 1).unwrap(),
        duration: 2.0,
        lip_timeline: ab_timeline(),
        blink_timeline: None,
    };

    let mut sink = InMemorySink::new();
    render_to_sink(&config, &assets, &RenderThreading::default(), &mut sink).unwrap();

    // No event lies in (0.0s, 0.9s]: frames 0..=9 are identical.
    let first = &sink.frames()[0].1;
    for (idx, frame) in &sink.frames()[1..10] {
        assert_eq!(frame.data, first.data, "frame {} changed spuriously", idx.0);
    }
}

#[test]
fn frame_count_covers_partial_trailing_interval() {
    let dir = fixture_dir("frame_count");
    let assets = RenderAssets::prepare(mouth_table(&dir), None, None).unwrap();

    for (duration, fps, expect) in [(2.0, 10, 20), (2.05, 10, 21), (0.04, 25, 1), (1.0, 24, 24)] {
        let lip = Timeline::new(
            vec![TimedEvent {
                start: 0.0,
                label: label('A'),
            }],
            duration,
        )
        .unwrap();
        let config = RenderConfig {
            fps: Fps::new(fps, 1).unwrap(),
            duration,
            lip_timeline: lip,
            blink_timeline: None,
        };
        assert_eq!(config.frame_count(), expect);

        let mut sink = InMemorySink::new();
        let stats =
            render_to_sink(&config, &assets, &RenderThreading::default(), &mut sink).unwrap();
        assert_eq!(stats.frames_total, expect);
        assert_eq!(sink.frames().len() as u64, expect);
    }
}

#[test]
fn unmapped_label_fails_before_any_frame() {
    let dir = fixture_dir("unmapped");
    let assets = RenderAssets::prepare(mouth_table(&dir), None, None).unwrap();

    let lip = Timeline::new(
        vec![
            TimedEvent {
                start: 0.0,
                label: label('A'),
            },
            TimedEvent {
                start: 1.0,
                label: label('C'),
            },
        ],
        2.0,
    )
    .unwrap();
    let config = RenderConfig {
        fps: Fps::new(10, 1).unwrap(),
        duration: 2.0,
        lip_timeline: lip,
        blink_timeline: None,
    };

    let mut sink = InMemorySink::new();
    let err = render_to_sink(&config, &assets, &RenderThreading::default(), &mut sink).unwrap_err();
    assert!(matches!(err, LipwaveError::UnknownLabel(_)));
    assert!(err.to_string().contains("'C'"));
    assert!(sink.frames().is_empty());
}

#[test]
fn dimension_mismatch_fails_at_prepare_time() {
    let dir = fixture_dir("dims");
    write_png(&dir, "bg.png", 8, 6, [0, 0, 0, 255]);
    let background = load_image(&dir.join("bg.png")).unwrap();

    let err = RenderAssets::prepare(mouth_table(&dir), None, Some(background)).unwrap_err();
    assert!(matches!(err, LipwaveError::DimensionMismatch(_)));
}

#[test]
fn canvas_inferred_from_first_overlay_without_background() {
    let dir = fixture_dir("infer_canvas");
    let assets = RenderAssets::prepare(mouth_table(&dir), None, None).unwrap();
    assert_eq!(
        assets.canvas,
        Canvas {
            width: 4,
            height: 4
        }
    );
}

#[test]
fn blink_layer_composites_on_top_of_mouth() {
    let dir = fixture_dir("blink_layer");
    let mouth = mouth_table(&dir);

    write_png(&dir, "open.png", 4, 4, [0, 0, 0, 0]);
    write_png(&dir, "half.png", 4, 4, [0, 0, 128, 255]);
    write_png(&dir, "closed.png", 4, 4, [0, 0, 255, 255]);
    std::fs::write(
        dir.join("blink.txt"),
        "A,open.png\nB,half.png\nC,closed.png\n",
    )
    .unwrap();
    let blink = MappingTable::load(&dir.join("blink.txt")).unwrap();

    let blink_tl = Timeline::new(
        vec![
            TimedEvent {
                start: 0.0,
                label: label('A'),
            },
            TimedEvent {
                start: 0.5,
                label: label('B'),
            },
            TimedEvent {
                start: 0.6,
                label: label('C'),
            },
            TimedEvent {
                start: 0.7,
                label: label('A'),
            },
        ],
        2.0,
    )
    .unwrap();

    let assets = RenderAssets::prepare(mouth, Some(blink), None).unwrap();
    let config = RenderConfig {
        fps: Fps::new(10, 1).unwrap(),
        duration: 2.0,
        lip_timeline: ab_timeline(),
        blink_timeline: Some(blink_tl),
    };

    let mut sink = InMemorySink::new();
    render_to_sink(&config, &assets, &RenderThreading::default(), &mut sink).unwrap();

    // Frame 6 is at t=0.6s: eyes fully closed over mouth A. The closed
    // image is opaque, so it wins every pixel.
    let closed = assets.blink.as_ref().unwrap().resolve(label('C')).unwrap();
    assert_eq!(sink.frames()[6].1.data, *closed.rgba8_premul.as_ref());

    // Frame 0 has the fully transparent open overlay: mouth A shows through.
    let mouth_a = assets.mouth.resolve(label('A')).unwrap();
    assert_eq!(sink.frames()[0].1.data, *mouth_a.rgba8_premul.as_ref());
}

#[test]
fn blink_timeline_without_table_is_rejected() {
    let dir = fixture_dir("blink_no_table");
    let assets = RenderAssets::prepare(mouth_table(&dir), None, None).unwrap();

    let config = RenderConfig {
        fps: Fps::new(10, 1).unwrap(),
        duration: 2.0,
        lip_timeline: ab_timeline(),
        blink_timeline: Some(
            Timeline::new(
                vec![TimedEvent {
                    start: 0.0,
                    label: label('A'),
                }],
                2.0,
            )
            .unwrap(),
        ),
    };

    let mut sink = InMemorySink::new();
    let err = render_to_sink(&config, &assets, &RenderThreading::default(), &mut sink).unwrap_err();
    assert!(matches!(err, LipwaveError::Validation(_)));
}
