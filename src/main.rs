//! Demo binary: wires the recording engine to simulated producers, runs one
//! short session to the duration timeout, then lists what is stored.

use crossbeam_channel::bounded;
use std::thread;
use std::time::Duration;
use vitalrec::{
    EngineEvent, GsrSample, ImuSample, RecordingConfig, RecordingEngine, Settings, SignalKind,
    SignalMask,
};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Using default settings: {}", e);
            Settings::default()
        }
    };
    log::info!("Storage root: {}", settings.storage_dir.display());

    // Bounded channel to the "transport": the timer drops snapshots rather
    // than block when this consumer falls behind
    let (event_tx, event_rx) = bounded(settings.status_queue_depth);
    let consumer = thread::spawn(move || {
        for event in event_rx {
            match event {
                EngineEvent::Status(status) => log::info!(
                    "status: {:?} {}/{} s, {} samples",
                    status.state,
                    status.elapsed_s,
                    status.total_s,
                    status.samples_written
                ),
                EngineEvent::SessionIndex(record) => log::info!(
                    "stored session {}: mask {:#04x}, {} bytes",
                    record.timestamp,
                    record.signal_mask,
                    record.size_bytes
                ),
            }
        }
    });

    let engine = RecordingEngine::new(settings, event_tx);

    let mask = SignalMask::from_kinds(&[SignalKind::Gsr, SignalKind::ImuAccel]);
    let config = RecordingConfig::new(5, mask, 1);
    if let Err(e) = engine.configure(config) {
        log::error!("configure failed: {}", e);
        return;
    }
    if let Err(e) = engine.start() {
        log::error!("start failed: {}", e);
        return;
    }

    // Simulated producers: one batch per second at each signal's nominal
    // rate, until the duration timeout finalizes the session
    let mut second = 0u32;
    while engine.is_active() {
        let gsr: Vec<GsrSample> = (0..32)
            .map(|i| GsrSample {
                value: 1000 + second * 32 + i,
            })
            .collect();
        engine.submit_gsr(&gsr);

        let accel: Vec<ImuSample> = (0..100)
            .map(|i| ImuSample {
                x: (i as i16) - 50,
                y: 0,
                z: 981,
            })
            .collect();
        engine.submit_imu_accel(&accel);

        second += 1;
        thread::sleep(Duration::from_secs(1));
    }

    let listed = engine.list_sessions();
    log::info!(
        "{} sessions on disk, {} bytes total",
        listed,
        engine.storage_usage_bytes()
    );

    drop(engine);
    let _ = consumer.join();
}
