//! Loopback playback demo
//!
//! Feeds a scripted stream through an in-process transport into headless
//! sinks: init segment, interleaved media, a track switch and a seek.
//!
//! Run with: `cargo run --example loopback_playback`

use anyhow::Result;
use segstream::{
    encode_base64, ContentKind, DebugLogger, EventHandler, HeadlessPresentation,
    LoopbackTransport, Player, PlayerConfig, PlayerEvent,
};
use std::time::Duration;

fn init_message(generation: u8) -> String {
    format!(
        r#"{{"type":"init","metadata":{{"streams":[{{"track_id":"v1","content":"video","bitrate":2000000}},{{"track_id":"v2","content":"video","bitrate":500000}},{{"track_id":"a1","content":"audio"}}]}},"tracks":[{{"id":1,"payload":"{}"}},{{"id":2,"payload":"{}"}}]}}"#,
        encode_base64(&[0x00, generation]),
        encode_base64(&[0x01, generation])
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    DebugLogger::init_with_filter("segstream=debug")?;

    let transport = LoopbackTransport::new();
    let presentation = HeadlessPresentation::new();
    let config = PlayerConfig::default()
        .progress_update_interval(Duration::from_millis(50))
        .errors_before_stop(3)
        .debug(true);

    let player = Player::builder("http://localhost:8080/cam1/mse_ld")
        .config(config)
        .transport(transport.clone())
        .presentation(presentation.clone())
        .build()?;

    let handler = EventHandler::new(|event| match &event {
        PlayerEvent::MediaInfo { info } => {
            println!("📋 Media info: {} streams", info.streams.len());
        }
        PlayerEvent::Progress { .. } => {
            if let Some(at) = event.progress_time() {
                println!("⏱️  Position: {}", at);
            }
        }
        PlayerEvent::Error { code, message, fatal } => {
            println!("❌ {} ({}), fatal: {}", message, code, fatal);
        }
        other => println!("🔔 {}", other.event_type()),
    });
    player.attach_handler(&handler)?;

    println!("▶️  Starting playback of {}", player.url());
    player.play(None, "", "").await?;

    transport.push_text(init_message(1));
    for i in 0..10u8 {
        transport.push_segment(1, vec![0x10, i]);
        if i % 2 == 0 {
            transport.push_segment(2, vec![0x20, i]);
        }
    }
    presentation.set_position(Some(1_700_000_000.0));
    tokio::time::sleep(Duration::from_millis(120)).await;

    if let Some(video) = player.video_tracks().await? {
        let selectors: Vec<&str> = video.iter().map(|s| s.track_id.as_str()).collect();
        println!("🎞️  Video streams: {:?}", selectors);
    }

    println!("🔀 Switching to the low bitrate stream");
    player.set_tracks(["v2", "a1"]).await?;
    transport.push_segment(1, vec![0x30, 0]);
    transport.push_text(r#"{"type":"event"}"#);
    transport.push_text(init_message(2));

    println!("⏩ Seeking to live");
    player.seek("live").await?;
    transport.push_text(init_message(3));
    presentation.set_position(Some(1_700_000_004.0));
    tokio::time::sleep(Duration::from_millis(120)).await;

    let stats = player.stats().await?;
    println!("📊 Session stats:\n{}", stats.to_json());
    if let Some(video) = presentation.sink(ContentKind::Video) {
        println!("🎥 Video sink received {} payloads", video.appended().len());
    }

    player.stop().await?;
    println!("⏹️  Stopped");
    Ok(())
}
