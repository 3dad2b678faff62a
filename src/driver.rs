use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::clock::{ClockJump, VirtualClock};
use crate::config::{RadioConfig, Session};
use crate::link::LinkBudget;
use crate::radio::{
    AudioDecoder, AudioOutput, AudioSource, AudioStreamMixer, NoiseGenerator, RadioError,
    SinkClock, StepClock, TickOutcome, WavDecoder, WavOutput,
};

const STATUS_EVERY_SECONDS: i64 = 5;

pub struct ListenOptions {
    pub out: PathBuf,
    pub duration: Duration,
    pub offline: bool,
    /// Listening times at which the radio switch is flipped.
    pub toggle_at: Vec<Duration>,
    pub jumps: Vec<ClockJump>,
}

type ProgramRx = oneshot::Receiver<Result<AudioSource, RadioError>>;

/// Drives the mixer on a fixed cadence until `options.duration` has passed.
///
/// The program file is decoded on a blocking task while the radio already
/// plays noise; it is handed over through a oneshot channel once ready.
/// Offline runs wait for it, then advance a stepped audio clock one tick at
/// a time instead of sleeping.
pub async fn listen(
    session: &Session,
    radio: &RadioConfig,
    mut clock: VirtualClock,
    options: ListenOptions,
) -> Result<(), RadioError> {
    let budget = LinkBudget::new(&session.satellite, session.observer, session.link);
    let mut mixer_config = radio.mixer_config();

    // Run the output at the program's rate from the start so the recording
    // never changes rate mid-file.
    if let Some(path) = &radio.program {
        match WavDecoder::probe(path) {
            Ok(rate) => mixer_config.fallback_sample_rate = rate,
            Err(e) => log::warn!("cannot read {}: {}", path.display(), e),
        }
    }

    let step_clock = StepClock::default();
    let sink_clock = if options.offline {
        SinkClock::Stepped(step_clock.clone())
    } else {
        SinkClock::Wall
    };
    let output = WavOutput::new(
        &options.out,
        mixer_config.fallback_sample_rate,
        sink_clock,
    );
    let mut mixer = AudioStreamMixer::new(output, mixer_config, budget.noise_level_db())?;
    if let Some(seed) = radio.noise_seed {
        mixer = mixer.with_noise(NoiseGenerator::with_seed(seed));
    }

    let mut pending = radio.program.clone().map(spawn_decode);
    if options.offline {
        if let Some(rx) = pending.take() {
            log::info!("waiting for program audio");
            match rx.await {
                Ok(Ok(source)) => mixer.load_program(source),
                Ok(Err(e)) => log::warn!("program unavailable, noise only: {}", e),
                Err(_) => log::warn!("program decoder went away, noise only"),
            }
        }
    }

    log::info!(
        "listening to {} from {} (epoch {}, offset {}) for {}s{}",
        session.satellite.name(),
        clock.now(),
        clock.epoch(),
        clock.offset(),
        options.duration.num_seconds(),
        if options.offline { " (offline)" } else { "" }
    );
    log::debug!(
        "queue depth {}s, quantum {}s",
        mixer.config().target_buffer_seconds,
        mixer.config().quantum_seconds
    );

    mixer.turn_on()?;

    let mut toggles: Vec<Duration> = options.toggle_at.clone();
    toggles.sort();
    let mut toggles = toggles.into_iter().peekable();
    let mut jumps = options.jumps.clone();
    jumps.sort_by_key(|j| j.at);
    let mut jumps = jumps.into_iter().peekable();

    let tick = radio.tick_interval();
    let limit = options.duration.to_std().unwrap_or_default();
    let mut interval = tokio::time::interval(tick);
    let mut elapsed = std::time::Duration::ZERO;
    let mut last_status: Option<DateTime<Utc>> = None;

    while elapsed < limit {
        if options.offline {
            elapsed += tick;
            step_clock.advance(tick.as_secs_f64());
        } else {
            interval.tick().await;
            elapsed = clock.elapsed();
        }
        let due = |at: &Duration| at.to_std().map_or(true, |at| at <= elapsed);

        while let Some(jump) = jumps.next_if(|j| due(&j.at)) {
            clock.adjust_offset(jump.offset);
            log::info!(
                "clock moved by {}, now {}",
                jump.offset,
                clock.at_elapsed(elapsed)
            );
        }
        while toggles.next_if(|at| due(at)).is_some() {
            if let Err(e) = mixer.toggle() {
                log::error!("radio switch failed: {}", e);
            }
        }

        poll_program(&mut pending, &mut mixer);

        let now = clock.at_elapsed(elapsed);
        match mixer.tick(now, &budget) {
            Ok(TickOutcome::Scheduled(chunk)) => {
                let due = last_status
                    .map_or(true, |t| now - t >= Duration::seconds(STATUS_EVERY_SECONDS));
                if due {
                    last_status = Some(now);
                    let snap = mixer.snapshot();
                    match budget.look_angles(now) {
                        Some(look) => log::info!(
                            "{}  el {:6.2}  az {:6.2}  range {:8.1} km  signal {:6.1} dB  [{}, tape {}]",
                            now.format("%H:%M:%S"),
                            look.elevation_deg,
                            look.azimuth_deg,
                            look.range_km,
                            chunk.signal_level_db,
                            snap.phase,
                            snap.read_cursor
                        ),
                        None => log::info!(
                            "{}  no geometry  [{}]",
                            now.format("%H:%M:%S"),
                            snap.phase
                        ),
                    }
                }
            }
            Ok(_) => {}
            Err(e) => log::error!("radio tick failed: {}", e),
        }
    }

    mixer.turn_off()?;
    log::info!("done, recording in {}", options.out.display());
    Ok(())
}

fn spawn_decode(path: PathBuf) -> ProgramRx {
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let _ = tx.send(WavDecoder.decode(&path));
    });
    rx
}

fn poll_program<O: AudioOutput>(pending: &mut Option<ProgramRx>, mixer: &mut AudioStreamMixer<O>) {
    let Some(rx) = pending.as_mut() else {
        return;
    };
    match rx.try_recv() {
        Ok(Ok(source)) => {
            mixer.load_program(source);
            *pending = None;
        }
        Ok(Err(e)) => {
            log::warn!("program unavailable, noise only: {}", e);
            *pending = None;
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Closed) => *pending = None,
    }
}
