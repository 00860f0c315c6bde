//! Track queue and flush engine behaviour across many append/flush cycles

use bytes::Bytes;
use segstream_core::ContentKind;
use segstream_media::*;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

struct Fixture {
    tracks: TrackSet,
    video: MemorySinkHandle,
    audio: MemorySinkHandle,
    events: mpsc::UnboundedReceiver<SinkEvent>,
}

fn fixture() -> Fixture {
    let (tx, events) = mpsc::unbounded_channel();
    let video_sink = MemorySink::new(SinkNotifier::new(1, tx.clone()));
    let audio_sink = MemorySink::new(SinkNotifier::new(2, tx)).with_segment_duration(0.25);
    let video = video_sink.handle();
    let audio = audio_sink.handle();

    let mut tracks = TrackSet::new();
    assert_ok!(tracks.add(Track::new(1, ContentKind::Video, "v1", Box::new(video_sink))));
    assert_ok!(tracks.add(Track::new(2, ContentKind::Audio, "a1", Box::new(audio_sink))));

    Fixture {
        tracks,
        video,
        audio,
        events,
    }
}

/// Deliver pending sink notifications the way the player does: flush first,
/// then one queued append per idle sink.
fn pump(f: &mut Fixture, flush: &mut FlushEngine, appended: &mut usize) {
    while let Ok(event) = f.events.try_recv() {
        if flush.is_pending() {
            if flush.step(&mut f.tracks, appended) != FlushStatus::Completed {
                continue;
            }
            for track in f.tracks.iter_mut() {
                if track.drain_one().unwrap() {
                    *appended += 1;
                }
            }
            continue;
        }
        if let Some(track) = f.tracks.get_mut(event.track_id) {
            if track.drain_one().unwrap() {
                *appended += 1;
            }
        }
    }
}

#[test]
fn test_fifo_per_track_under_interleaving() {
    let mut f = fixture();
    let mut flush = FlushEngine::default();
    let mut appended = 0;

    for i in 0..40u8 {
        let id = if i % 3 == 0 { 2 } else { 1 };
        let track = f.tracks.resolve(id).unwrap();
        if f
            .tracks
            .get_mut(track)
            .unwrap()
            .enqueue(Segment::media(id, Bytes::from(vec![i])), false)
            .unwrap()
            == Delivery::Appended
        {
            appended += 1;
        }
        // Complete sinks at an uneven pace
        if i % 4 == 0 {
            f.video.complete();
        }
        if i % 5 == 0 {
            f.audio.complete();
        }
        pump(&mut f, &mut flush, &mut appended);
    }
    for _ in 0..40 {
        f.video.complete();
        f.audio.complete();
        pump(&mut f, &mut flush, &mut appended);
    }

    let video: Vec<u8> = f.video.appended().iter().map(|p| p[0]).collect();
    let audio: Vec<u8> = f.audio.appended().iter().map(|p| p[0]).collect();
    let expected_video: Vec<u8> = (0..40u8).filter(|i| i % 3 != 0).collect();
    let expected_audio: Vec<u8> = (0..40u8).filter(|i| i % 3 == 0).collect();
    assert_eq!(video, expected_video);
    assert_eq!(audio, expected_audio);
    assert_eq!(appended, 40);
}

#[test]
fn test_flush_then_queued_appends_resume() {
    let mut f = fixture();
    let mut flush = FlushEngine::default();

    f.video.set_buffered(vec![TimeRange::new(0.0, 4.0), TimeRange::new(5.0, 9.0)]);
    f.audio.set_buffered(vec![TimeRange::new(0.0, 9.0)]);
    let mut appended = 3;

    flush.request(FlushRange::all());
    assert_eq!(flush.step(&mut f.tracks, &mut appended), FlushStatus::Pending);

    // New data arrives while the flush is in flight; it must wait
    for b in [10u8, 11] {
        let hold = flush.is_pending();
        f.tracks
            .get_mut(1)
            .unwrap()
            .enqueue(Segment::init(1, Bytes::from(vec![b])), hold)
            .unwrap();
    }
    assert!(f.video.appended().is_empty());

    for _ in 0..10 {
        f.video.complete();
        f.audio.complete();
        pump(&mut f, &mut flush, &mut appended);
    }

    assert!(!flush.is_pending());
    assert_eq!(f.video.removals().len(), 2);
    assert_eq!(f.audio.removals().len(), 1);
    let order: Vec<u8> = f.video.appended().iter().map(|p| p[0]).collect();
    assert_eq!(order, vec![10, 11]);
    assert!(f.audio.buffered().is_empty());
}

#[test]
fn test_flush_terminates_with_inconsistent_sink() {
    // A sink whose removals never shrink the buffer: flush must still end
    let mut f = fixture();
    let mut flush = FlushEngine::default();
    let mut appended = 5;

    flush.request(FlushRange::all());
    let mut steps = 0;
    loop {
        f.video.set_buffered(vec![TimeRange::new(0.0, 10.0)]);
        let status = flush.step(&mut f.tracks, &mut appended);
        steps += 1;
        if status == FlushStatus::Completed {
            break;
        }
        f.video.complete();
        assert!(steps < 100, "flush did not terminate");
    }
    assert_eq!(f.video.removals().len(), 5);
    assert_eq!(flush.removals_total(), 5);
    assert_eq!(flush.abandoned_total(), 1);
}
