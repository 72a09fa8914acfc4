//! lightbake-bake - submit a scene to a lightbake server and follow the bake.
//!
//! Prints the active stage while the job runs and a per-stage summary once
//! it ends. Ctrl-C cancels the job on the server before exiting.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use lightbake_client::{ClientError, HttpJobService, JobPoller};
use lightbake_core::bake::{
    BakeKind, BakeParams, BakeRequest, Denoise, DEFAULT_MARGIN, DEFAULT_RESOLUTION,
    DEFAULT_SAMPLES, DEFAULT_STEPS,
};
use lightbake_core::timeline::{StageRecord, StageTimeline};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code used when the bake was cancelled (128 + SIGINT).
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "lightbake-bake")]
#[command(about = "Bake lightmaps for a scene on a lightbake server", long_about = None)]
struct Args {
    /// Scene to upload (glTF binary)
    input: PathBuf,

    /// Scene kind: island or iso_scene
    #[arg(long, default_value = "island")]
    kind: BakeKind,

    /// Game the scene belongs to
    #[arg(long)]
    game: String,

    /// Scene name (defaults to the input file stem)
    #[arg(long)]
    name: Option<String>,

    /// Server root URL
    #[arg(long, env = "LIGHTBAKE_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Delay between two status polls, in milliseconds
    #[arg(long, default_value = "1000")]
    poll_interval_ms: u64,

    /// Comma-separated bake steps
    #[arg(long, default_value = DEFAULT_STEPS)]
    steps: String,

    /// Samples per texel
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: u32,

    /// Lightmap size in texels (power of two)
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: u32,

    /// Texel margin around lightmap islands
    #[arg(long, default_value_t = DEFAULT_MARGIN)]
    margin: u32,

    /// Denoiser: NONE, FAST or ACCURATE
    #[arg(long, default_value = "FAST")]
    denoise: Denoise,

    /// HDR environment map file name on the server
    #[arg(long)]
    hdri: Option<String>,

    /// Environment map rotation in degrees
    #[arg(long)]
    hdri_rotation: Option<f64>,

    /// Environment map exposure
    #[arg(long)]
    hdri_exposure: Option<f64>,

    /// Dump the intermediate scene after this step
    #[arg(long)]
    dump_after: Option<String>,
}

impl Args {
    fn request(&self) -> anyhow::Result<BakeRequest> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => self
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .context("cannot derive a scene name from the input path, pass --name")?,
        };

        let request = BakeRequest {
            kind: self.kind,
            game: self.game.clone(),
            name,
            params: BakeParams {
                steps: self.steps.clone(),
                samples: self.samples,
                resolution: self.resolution,
                margin: self.margin,
                denoise: self.denoise,
                hdri: self.hdri.clone(),
                hdri_rotation: self.hdri_rotation,
                hdri_exposure: self.hdri_exposure,
                dump_after: self.dump_after.clone(),
            },
        };
        request.validate()?;
        Ok(request)
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lightbake_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => {}
        Err(e) if is_cancelled(&e) => {
            eprintln!("Bake cancelled");
            process::exit(EXIT_CANCELLED);
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let request = args.request()?;
    let payload = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    println!("Baking {} ({} bytes)", args.input.display(), payload.len());
    println!("  Server: {}", args.server);
    println!(
        "  Target: {}/{}/{}",
        request.game,
        request.kind.target_dir(),
        request.name
    );
    println!();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let timeline = StageTimeline::new();
    let ticker = tokio::spawn(report_progress(timeline.clone()));

    let poller = JobPoller::new(HttpJobService::new(args.server.as_str()))
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms));
    let outcome = poller.run(&request, payload, &timeline, &cancel).await;

    ticker.abort();
    print_summary(&timeline.records());

    let result = outcome?;
    if let Some(output) = result.get("output").and_then(|v| v.as_str()) {
        println!("Output: {output}");
    }
    Ok(())
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ClientError>()
        .is_some_and(ClientError::is_cancelled)
}

/// Print the in-flight stage every second until aborted.
async fn report_progress(timeline: StageTimeline) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let Some(record) = timeline.records().pop() else {
            continue;
        };
        if record.is_closed() {
            continue;
        }
        match record.eta {
            Some(eta) => println!(
                "  {:<24} {:>3.0}%  eta {}",
                record.name,
                record.progress * 100.0,
                format_duration(eta)
            ),
            None => println!("  {:<24} {:>3.0}%", record.name, record.progress * 100.0),
        }
    }
}

fn print_summary(records: &[StageRecord]) {
    if records.is_empty() {
        return;
    }
    println!();
    println!("Stages:");
    for record in records {
        let status = if record.cancelled {
            "failed"
        } else if record.is_closed() {
            "done"
        } else {
            "open"
        };
        let duration = record.duration.map(format_duration).unwrap_or_default();
        println!("  {:<24} {:<7} {:>8}", record.name, status, duration);
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_defaults_to_file_stem() {
        let args = Args::parse_from(["lightbake-bake", "scenes/citadel.glb", "--game", "lba2"]);
        let request = args.request().unwrap();
        assert_eq!(request.name, "citadel");
        assert_eq!(request.kind, BakeKind::Island);
        assert_eq!(request.params, BakeParams::default());
    }

    #[test]
    fn flags_map_onto_params() {
        let args = Args::parse_from([
            "lightbake-bake",
            "scene.glb",
            "--kind",
            "iso-scene",
            "--game",
            "lba1",
            "--name",
            "twinsen_house",
            "--samples",
            "256",
            "--resolution",
            "1024",
            "--denoise",
            "accurate",
            "--hdri",
            "sky.hdr",
            "--dump-after",
            "bake",
        ]);
        let request = args.request().unwrap();
        assert_eq!(request.kind, BakeKind::IsoScene);
        assert_eq!(request.name, "twinsen_house");
        assert_eq!(request.params.samples, 256);
        assert_eq!(request.params.resolution, 1024);
        assert_eq!(request.params.denoise, Denoise::Accurate);
        assert_eq!(request.params.hdri.as_deref(), Some("sky.hdr"));
        assert_eq!(request.params.dump_step(), Some("bake"));
    }

    #[test]
    fn invalid_params_fail_before_upload() {
        let args = Args::parse_from([
            "lightbake-bake",
            "scene.glb",
            "--game",
            "lba2",
            "--resolution",
            "500",
        ]);
        assert!(args.request().is_err());
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn cancelled_client_error_is_detected_through_anyhow() {
        let err = anyhow::Error::new(ClientError::Cancelled);
        assert!(is_cancelled(&err));
        assert!(!is_cancelled(&anyhow::anyhow!("boom")));
    }
}
