mod clock;
mod config;
mod driver;
mod link;
mod predict;
mod radio;
mod tracker;

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::clock::{ClockJump, VirtualClock};
use crate::config::{parse_duration, parse_jump, parse_offset, Config, Session};
use crate::driver::ListenOptions;
use crate::link::{LinkBudget, SignalLevel};
use crate::predict::{next_pass, Pass, DEFAULT_THRESHOLD_DEG};
use crate::tracker::{
    altitude_km, footprint_radius_km, ground_track, sub_satellite_point, LookAngles, TrackPoint,
};

#[derive(Parser)]
#[command(name = "sat-o-radio")]
#[command(about = "Simulated satellite downlink: tracking, passes and radio audio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    /// Station configuration file
    #[arg(long, short)]
    config: String,
    /// Simulation start (RFC 3339); defaults to now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    /// Signed offset applied to the simulation clock, e.g. `-90m`
    #[arg(long, value_parser = parse_offset, allow_hyphen_values = true)]
    offset: Option<Duration>,
}

impl SessionArgs {
    fn clock(&self) -> VirtualClock {
        let mut clock = VirtualClock::starting_at(self.at.unwrap_or_else(Utc::now));
        if let Some(offset) = self.offset {
            clock.adjust_offset(offset);
        }
        clock
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a station configuration file
    Validate {
        #[arg(long, short)]
        config: String,
    },
    /// Show where the satellite is and how strong its signal would be
    Look {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        json: bool,
    },
    /// Predict the next pass above an elevation threshold
    NextPass {
        #[command(flatten)]
        session: SessionArgs,
        /// Minimum elevation in degrees
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_DEG, allow_hyphen_values = true)]
        threshold: f64,
        #[arg(long)]
        json: bool,
    },
    /// Sample the sub-satellite ground track
    GroundTrack {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long, default_value_t = 90)]
        minutes: i64,
        #[arg(long, value_parser = parse_duration, default_value = "1m")]
        step: Duration,
        #[arg(long)]
        json: bool,
    },
    /// Record what the station's radio hears to a WAV file
    Listen {
        #[command(flatten)]
        session: SessionArgs,
        /// Output WAV file
        #[arg(long, short)]
        out: PathBuf,
        /// How long to listen, e.g. `30s` or `10m`
        #[arg(long, value_parser = parse_duration)]
        duration: Duration,
        /// Render on a stepped clock instead of waiting for real time
        #[arg(long)]
        offline: bool,
        /// Flip the radio switch after this much listening; repeatable
        #[arg(long = "toggle-at", value_parser = parse_duration)]
        toggle_at: Vec<Duration>,
        /// Shift the clock mid-listen, as `AT=OFFSET` (e.g. `30s=+90m`); repeatable
        #[arg(long, value_parser = parse_jump, allow_hyphen_values = true)]
        jump: Vec<ClockJump>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Look { session, json } => {
            with_session(&session, |_, s| look(s, session.clock().now(), json))
        }
        Commands::NextPass {
            session,
            threshold,
            json,
        } => with_session(&session, |_, s| {
            show_next_pass(s, session.clock().now(), threshold, json)
        }),
        Commands::GroundTrack {
            session,
            minutes,
            step,
            json,
        } => with_session(&session, |_, s| {
            show_ground_track(s, session.clock().now(), minutes, step, json)
        }),
        Commands::Listen {
            session,
            out,
            duration,
            offline,
            toggle_at,
            jump,
        } => with_session(&session, |config, s| {
            let options = ListenOptions {
                out: out.clone(),
                duration,
                offline,
                toggle_at: toggle_at.clone(),
                jumps: jump.clone(),
            };
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Error starting runtime: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            match runtime.block_on(driver::listen(s, &config.radio, session.clock(), options)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Radio error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }),
    }
}

fn load(path: &str) -> Result<(Config, Session), config::ConfigError> {
    let config = Config::from_file(path)?;
    let session = config.build_session()?;
    Ok((config, session))
}

fn with_session<F>(args: &SessionArgs, f: F) -> ExitCode
where
    F: FnOnce(&Config, &Session) -> ExitCode,
{
    match load(&args.config) {
        Ok((config, session)) => f(&config, &session),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &str) -> ExitCode {
    match load(path) {
        Ok((config, session)) => {
            println!("Configuration is valid");
            println!(
                "  station:   {} ({:.4}, {:.4}, {:.3} km)",
                session.station_name,
                session.observer.latitude_deg,
                session.observer.longitude_deg,
                session.observer.elevation_km
            );
            println!(
                "  satellite: {} (NORAD {}, epoch {})",
                session.satellite.name(),
                session.satellite.norad_id(),
                session.satellite.epoch()
            );
            println!(
                "  link:      {} W @ {} MHz, antenna {} dB, noise floor {} dB",
                session.link.transmit_power_w,
                session.link.frequency_mhz,
                session.link.antenna_gain_db,
                session.link.noise_floor_db
            );
            match &config.radio.program {
                Some(p) => println!("  program:   {}", p.display()),
                None => println!("  program:   none (noise only)"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[derive(Serialize)]
struct LookReport {
    time: DateTime<Utc>,
    satellite: String,
    look_angles: Option<LookAngles>,
    sub_satellite_point: Option<(f64, f64)>,
    altitude_km: Option<f64>,
    footprint_radius_km: Option<f64>,
    signal_level_db: f64,
    noise_level_db: f64,
}

fn look(session: &Session, now: DateTime<Utc>, json: bool) -> ExitCode {
    let budget = LinkBudget::new(&session.satellite, session.observer, session.link);
    let altitude = altitude_km(&session.satellite, now);
    let report = LookReport {
        time: now,
        satellite: session.satellite.name(),
        look_angles: budget.look_angles(now),
        sub_satellite_point: sub_satellite_point(&session.satellite, now),
        altitude_km: altitude,
        footprint_radius_km: altitude.map(footprint_radius_km),
        signal_level_db: budget.signal_level_db(now),
        noise_level_db: budget.noise_level_db(),
    };

    if json {
        return print_json(&report);
    }

    let na = || "N/A".to_string();
    println!("Time:       {}", report.time);
    println!("Satellite:  {}", report.satellite);
    println!("Frequency:  {} MHz", budget.params().frequency_mhz);
    match report.look_angles {
        Some(l) => {
            println!("Range:      {:.2} km", l.range_km);
            println!("Elevation:  {:.2}°", l.elevation_deg);
            println!("Azimuth:    {:.2}°", l.azimuth_deg);
        }
        None => println!("Look angles: {}", na()),
    }
    println!(
        "Position:   {}",
        report
            .sub_satellite_point
            .map(|(lat, lon)| format!("{:.4}, {:.4}", lat, lon))
            .unwrap_or_else(na)
    );
    println!(
        "Altitude:   {}",
        report
            .altitude_km
            .map(|a| format!("{:.1} km", a))
            .unwrap_or_else(na)
    );
    println!(
        "Footprint:  {}",
        report
            .footprint_radius_km
            .map(|r| format!("{:.0} km radius", r))
            .unwrap_or_else(na)
    );
    println!(
        "Signal:     {:.1} dB (noise {:.1} dB)",
        report.signal_level_db, report.noise_level_db
    );
    ExitCode::SUCCESS
}

fn show_next_pass(session: &Session, now: DateTime<Utc>, threshold: f64, json: bool) -> ExitCode {
    let pass: Option<Pass> = next_pass(&session.satellite, &session.observer, now, threshold);

    if json {
        return print_json(&pass);
    }

    match pass {
        Some(pass) => println!(
            "Next pass: {} -> {} ({}s, max elevation: {:.2}°)",
            pass.start,
            pass.end,
            pass.duration().num_seconds(),
            pass.max_elevation_deg
        ),
        None => println!("Next pass: N/A"),
    }
    ExitCode::SUCCESS
}

fn show_ground_track(
    session: &Session,
    now: DateTime<Utc>,
    minutes: i64,
    step: Duration,
    json: bool,
) -> ExitCode {
    let track: Vec<TrackPoint> =
        ground_track(&session.satellite, now, now + Duration::minutes(minutes), step);

    if json {
        return print_json(&track);
    }

    for point in &track {
        println!(
            "{}  {:>9.4} {:>10.4}  {:>7.1} km",
            point.timestamp, point.latitude_deg, point.longitude_deg, point.altitude_km
        );
    }
    ExitCode::SUCCESS
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            ExitCode::FAILURE
        }
    }
}
