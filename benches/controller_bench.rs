use criterion::{criterion_group, criterion_main, Criterion};
use stepgate::media::ElementEvent;
use stepgate::{EventSink, MediaFactory, RawMediaEvent, Selection, Sequence, SequenceController, Step, ViewerState};

fn long_sequence(len: usize) -> Sequence {
    let steps = (0..len)
        .map(|i| {
            let src = if i % 2 == 0 {
                format!("https://cdn.example.com/part-{}.mp4", i)
            } else {
                "https://youtu.be/dQw4w9WgXcQ".to_string()
            };
            Step::new(format!("part-{}", i), i, src)
        })
        .collect();
    Sequence::new("bench", steps).expect("valid sequence")
}

// Play every step of a 200-step sequence to its end.
fn bench_play_through(c: &mut Criterion) {
    let seq = long_sequence(200);
    let media = MediaFactory::default();

    c.bench_function("play_through_200", |b| {
        b.iter(|| {
            let mut ctl = SequenceController::new(seq.clone(), media.clone(), EventSink::new());
            for i in 0..seq.len() {
                if let Ok(Selection::Mounted { token }) = ctl.select_step(i) {
                    let end = if i % 2 == 0 {
                        RawMediaEvent::Element(ElementEvent::Ended)
                    } else {
                        RawMediaEvent::ProviderState(0)
                    };
                    let _ = ctl.handle_media_event(token, end);
                }
            }
            assert!(ctl.is_finished());
        })
    });
}

fn bench_capture_state(c: &mut Criterion) {
    let mut ctl = SequenceController::new(long_sequence(200), MediaFactory::default(), EventSink::new());
    for i in 0..100 {
        let _ = ctl.mark_completed(i);
    }

    c.bench_function("capture_viewer_state_200", |b| {
        b.iter(|| {
            let _ = ViewerState::capture(&ctl);
        })
    });
}

criterion_group!(benches, bench_play_through, bench_capture_state);
criterion_main!(benches);
