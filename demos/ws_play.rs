//! WebSocket playback demo
//!
//! Connects to a segment server, buffers into headless sinks and prints
//! events until Ctrl-C or the given number of seconds.
//!
//! Run with: `cargo run --example ws_play -- ws://localhost:8080/cam1/mse_ld [seconds]`

use segstream::{
    ContentKind, DebugLogger, HeadlessPresentation, Player, PlayerConfig, PlayerEvent,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    DebugLogger::init_logging()?;

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://localhost:8080/cam1/mse_ld".to_string());
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(30);

    let presentation = HeadlessPresentation::new();
    let player = Player::builder(&url)
        .config(PlayerConfig::default().connect_timeout(Duration::from_secs(5)))
        .presentation(presentation.clone())
        .build()?;
    let mut events = player.events();

    println!("🔌 Connecting to {}", player.url());
    player.play(None, "", "").await?;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(PlayerEvent::MediaInfo { info }) => {
                    for stream in &info.streams {
                        println!("📋 {} ({})", stream.track_id, stream.content);
                    }
                }
                Some(PlayerEvent::Error { message, fatal: true, .. }) => {
                    println!("❌ Session stopped: {}", message);
                    break;
                }
                Some(PlayerEvent::Error { message, .. }) => println!("⚠️  {}", message),
                Some(PlayerEvent::StateChanged { state }) => println!("🔔 State: {}", state),
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
        }
    }

    let stats = player.stats().await?;
    for track in &stats.tracks {
        println!(
            "📊 Track {} ({}): {} segments, {} bytes",
            track.track_id, track.kind, track.stats.segments_appended, track.stats.bytes_appended
        );
    }
    if let Some(audio) = presentation.sink(ContentKind::Audio) {
        println!("🔊 Audio buffered: {:?}", audio.buffered());
    }

    player.stop().await?;
    Ok(())
}
