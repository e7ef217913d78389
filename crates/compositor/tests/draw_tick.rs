mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::{filter, frame, push_and_wait, stub_stream, wait_for, Call, StubSurface, TIMEOUT};
use compositor::{AspectRatioMode, OrientationForced, Size};

#[test]
fn deferred_photo_fires_exactly_once() {
    let (stream, recorder) = stub_stream();
    stream.set_encoder_size(Size::new(320, 240));
    let captured = Arc::new(Mutex::new(Vec::new()));
    {
        let captured = Arc::clone(&captured);
        stream.request_photo(move |image| {
            captured.lock().unwrap().push(image.dimensions());
        });
    }
    assert!(stream.photo_pending());

    stream.start().expect("start");
    for _ in 0..3 {
        push_and_wait(&stream);
    }
    stream.stop();

    assert_eq!(*captured.lock().unwrap(), [(320, 240)]);
    assert!(!stream.photo_pending());
    assert_eq!(stream.render_stats().photo_frames, 1);
    let reads = recorder
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::ReadPixels(_, _)))
        .count();
    assert_eq!(reads, 1);
}

#[test]
fn photo_waits_for_its_target() {
    let (stream, recorder) = stub_stream();
    recorder.set_fail_offscreen(true);
    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = Arc::clone(&fired);
        stream.request_photo(move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        });
    }

    stream.start().expect("start without a photo target");
    push_and_wait(&stream);
    push_and_wait(&stream);
    stream.stop();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(stream.photo_pending());

    recorder.set_fail_offscreen(false);
    stream.start().expect("restart");
    push_and_wait(&stream);
    push_and_wait(&stream);
    stream.stop();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn newer_photo_request_replaces_pending_one() {
    let (stream, _recorder) = stub_stream();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    {
        let first = Arc::clone(&first);
        stream.request_photo(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = Arc::clone(&second);
        stream.request_photo(move |_| {
            second.fetch_add(1, Ordering::SeqCst);
        });
    }
    stream.start().expect("start");
    push_and_wait(&stream);
    stream.stop();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[test]
fn frame_rate_limit_bounds_encoder_and_preview_only() {
    const FPS: u32 = 10;
    let (stream, _recorder) = stub_stream();
    stream.set_fps(FPS);
    stream.start().expect("start");
    stream.add_encoder_surface(StubSurface::named("encoder"));
    stream.attach_preview(StubSurface::named("preview"));
    let photos = Arc::new(AtomicUsize::new(0));

    let input = stream.frame_input();
    let started = Instant::now();
    let mut pushed = 0;
    while started.elapsed() < Duration::from_millis(300) {
        input.push(frame());
        pushed += 1;
        if pushed == 50 {
            let photos = Arc::clone(&photos);
            stream.request_photo(move |_| {
                photos.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(1));
    }
    assert!(wait_for(TIMEOUT, || stream.render_stats().ticks >= pushed));
    let elapsed = started.elapsed().as_secs_f64();
    stream.stop();

    let stats = stream.render_stats();
    let bound = (elapsed * f64::from(FPS)).ceil() as u64 + 1;
    assert!(stats.encoder_frames >= 1);
    assert!(stats.encoder_frames <= bound, "{} > {bound}", stats.encoder_frames);
    assert!(stats.preview_frames <= bound, "{} > {bound}", stats.preview_frames);
    assert_eq!(stats.main_frames, stats.ticks);
    assert!(stats.limited_ticks > 0);
    assert_eq!(photos.load(Ordering::SeqCst), 1);
    assert_eq!(stats.photo_frames, 1);
}

#[test]
fn muted_encoder_draws_blank_while_preview_keeps_its_size() {
    let (stream, recorder) = stub_stream();
    stream.set_encoder_size(Size::new(640, 360));
    stream.set_preview_resolution(Size::new(360, 640));
    stream.start().expect("start");
    stream.add_encoder_surface(StubSurface::named("encoder"));
    stream.attach_preview(StubSurface::named("preview"));
    push_and_wait(&stream);

    stream.mute_video();
    assert!(stream.is_video_muted());
    for _ in 0..3 {
        push_and_wait(&stream);
    }
    stream.unmute_video();
    push_and_wait(&stream);
    stream.stop();

    let encoder = recorder.screen_draws("encoder");
    assert_eq!(encoder.len(), 5);
    assert_eq!(encoder[0].size, Size::new(640, 360));
    assert!(encoder[1..4].iter().all(|draw| draw.size == Size::ZERO));
    assert_eq!(encoder[4].size, Size::new(640, 360));

    let preview = recorder.screen_draws("preview");
    assert_eq!(preview.len(), 5);
    assert!(preview.iter().all(|draw| draw.size == Size::new(360, 640)));
}

#[test]
fn detached_target_is_skipped() {
    let (stream, recorder) = stub_stream();
    stream.start().expect("start");
    stream.add_encoder_surface(StubSurface::named("encoder"));
    push_and_wait(&stream);
    push_and_wait(&stream);
    assert_eq!(stream.render_stats().encoder_frames, 2);

    stream.remove_encoder_surface();
    push_and_wait(&stream);
    push_and_wait(&stream);
    stream.stop();

    assert_eq!(stream.render_stats().encoder_frames, 2);
    assert_eq!(recorder.screen_draws("encoder").len(), 2);
    assert_eq!(stream.render_stats().main_frames, 4);
}

#[test]
fn reattach_releases_previous_surface_first() {
    let (stream, recorder) = stub_stream();
    stream.start().expect("start");
    stream.attach_preview(StubSurface::named("preview-a"));
    stream.attach_preview(StubSurface::named("preview-b"));
    push_and_wait(&stream);
    stream.stop();

    let calls = recorder.calls();
    let released = calls
        .iter()
        .position(|call| *call == Call::Release("preview-a".into()))
        .expect("old preview released");
    let created = calls
        .iter()
        .position(|call| *call == Call::CreateSurface("preview-b".into()))
        .expect("new preview created");
    assert!(released < created);
    assert_eq!(recorder.screen_draws("preview-a").len(), 0);
    assert_eq!(recorder.screen_draws("preview-b").len(), 1);
}

#[test]
fn filter_commands_apply_one_per_tick_in_order() {
    let (stream, recorder) = stub_stream();
    stream.start().expect("start");
    let sepia = filter("sepia");
    stream.add_filter(filter("blur"));
    stream.add_filter(sepia.clone());
    stream.add_filter_at(0, filter("vignette"));
    stream.remove_filter(&sepia);
    stream.remove_filter_at(10);
    assert_eq!(stream.pending_filter_commands(), 5);

    for _ in 0..6 {
        push_and_wait(&stream);
    }
    assert_eq!(stream.filter_count(), 2);
    let chains = recorder.offscreen_filters();
    // Each tick draws with the chain as it was before that tick's command.
    assert_eq!(chains[0], Vec::<String>::new());
    assert_eq!(chains[1], ["blur"]);
    assert_eq!(chains[2], ["blur", "sepia"]);
    assert_eq!(chains[3], ["vignette", "blur", "sepia"]);
    assert_eq!(chains[4], ["vignette", "blur"]);
    assert_eq!(chains[5], ["vignette", "blur"]);

    stream.set_filter(filter("mono"));
    stream.clear_filters();
    for _ in 0..3 {
        push_and_wait(&stream);
    }
    stream.stop();
    let chains = recorder.offscreen_filters();
    assert_eq!(chains[7], ["mono", "blur"]);
    assert_eq!(chains[8], Vec::<String>::new());
    assert_eq!(stream.filter_count(), 0);
}

#[test]
fn preview_geometry_follows_orientation_and_aspect() {
    let (stream, recorder) = stub_stream();
    stream.set_encoder_size(Size::new(1280, 720));
    stream.set_preview_resolution(Size::new(1000, 1000));
    stream.set_aspect_ratio_mode(AspectRatioMode::Adjust);
    stream.start().expect("start");
    stream.attach_preview(StubSurface::named("preview"));
    stream.add_encoder_surface(StubSurface::named("encoder"));
    push_and_wait(&stream);

    stream.force_orientation(OrientationForced::Portrait);
    stream.set_preview_rotation(90);
    stream.set_stream_flip_vertical(true);
    push_and_wait(&stream);
    stream.stop();

    let preview = recorder.screen_draws("preview");
    assert!(!preview[0].portrait);
    assert_eq!(preview[0].viewport.width, 1000);
    assert_eq!(preview[0].viewport.height, 563);

    // Portrait layout rotated by a quarter turn is landscape again.
    assert!(preview[1].portrait);
    assert_eq!(preview[1].transform.rotation, 90);
    assert_eq!(preview[1].viewport.height, 563);
    assert!(!preview[1].transform.flip.vertical);

    let encoder = recorder.screen_draws("encoder");
    assert!(encoder[1].transform.flip.vertical);
    assert!(encoder[1].portrait);
    assert_eq!(encoder[1].aspect_ratio, AspectRatioMode::Adjust);
}

#[test]
fn forced_orientation_changes_encoder_geometry() {
    let (stream, recorder) = stub_stream();
    stream.set_encoder_size(Size::new(1280, 720));
    stream.start().expect("start");
    stream.add_encoder_surface(StubSurface::named("encoder"));

    stream.force_orientation(OrientationForced::Landscape);
    push_and_wait(&stream);
    stream.force_orientation(OrientationForced::Portrait);
    push_and_wait(&stream);
    stream.stop();

    let encoder = recorder.screen_draws("encoder");
    assert_eq!(encoder.len(), 2);
    assert_eq!(encoder[0].size, Size::new(1280, 720));
    assert_eq!(encoder[1].size, Size::new(1280, 720));
    assert_eq!(encoder[0].viewport.width, 1280);
    assert_eq!(encoder[0].viewport.x, 0);

    assert_ne!(encoder[0].viewport, encoder[1].viewport);
    assert_eq!(encoder[1].viewport.height, 720);
    assert_eq!(encoder[1].viewport.width, 405);
    assert_eq!(encoder[1].viewport.x, 438);
}

#[test]
fn camera_rotation_and_antialiasing_reach_the_offscreen_pass() {
    let (stream, recorder) = stub_stream();
    stream.set_camera_orientation(270);
    stream.enable_aa(true);
    assert!(stream.is_aa_enabled());
    stream.start().expect("start");
    push_and_wait(&stream);
    stream.stop();

    let pass = recorder
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::DrawOffscreen { pass, .. } => Some(pass),
            _ => None,
        })
        .expect("offscreen draw");
    assert_eq!(pass.camera_rotation, 270);
    assert!(pass.antialiasing);
}
