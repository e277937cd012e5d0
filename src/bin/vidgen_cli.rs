//! vidgen-cli: submit, watch and download video generation jobs.
//!
//! Usage:
//!   vidgen-cli submit --prompt <text> [media options]   Submit a job and print its id
//!   vidgen-cli status <job-id>                           One status check
//!   vidgen-cli run --prompt <text> [media options]      Submit and wait for the result
//!   vidgen-cli download <url> <path>                     Fetch a finished video

use anyhow::{anyhow, bail, Context};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vidgen_client::{
    GenerationJob, GenerationMode, GenerationRequest, ProgressEvent, VideoClient,
    VideoClientBuilder,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(2);
    }

    let rest = &args[2..];
    let outcome = match args[1].as_str() {
        "submit" => cmd_submit(rest).await,
        "status" => cmd_status(rest).await,
        "run" => cmd_run(rest).await,
        "download" => cmd_download(rest).await,
        "version" | "--version" | "-V" => {
            println!("vidgen-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(true)
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"vidgen-cli: video generation job client

USAGE:
    vidgen-cli <COMMAND> [OPTIONS]

COMMANDS:
    submit [REQUEST OPTIONS]        Submit a job and print its id
    status <job-id>                 Show the current state of a job
    run [REQUEST OPTIONS]           Submit a job and wait for the result
        --output <path>             Download the video when it is ready
    download <url> <path>           Download a finished video
    version                         Show version information
    help                            Show this help message

REQUEST OPTIONS:
    --prompt <text>                 Prompt; @video and @imageN refer to the media below
    --video <url>                   Reference video
    --image <url>                   Reference image (repeatable, up to 7)
    --mode <std|pro>                Generation mode (default std)
    --duration <5|10>               Clip length in seconds (default 5)
    --negative <text>               Negative prompt
    --aspect <ratio>                Aspect ratio, e.g. 16:9
    --model <name>                  Model override
    --no-audio                      Drop the reference video's audio

GLOBAL OPTIONS:
    --config <path>                 YAML config file

ENVIRONMENT:
    VIDGEN_ACCESS_KEY / VIDGEN_SECRET_KEY    Credentials
    VIDGEN_BASE_URL                          API endpoint
    RUST_LOG                                 Log filter (default warn)"#
    );
}

/// Value following `--flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn flag_values<'a>(args: &'a [String], flag: &str) -> Vec<&'a str> {
    args.iter()
        .enumerate()
        .filter(|(_, a)| a.as_str() == flag)
        .filter_map(|(i, _)| args.get(i + 1).map(String::as_str))
        .collect()
}

/// Arguments that are neither flags nor flag values.
fn positionals(args: &[String]) -> Vec<&str> {
    const VALUELESS: [&str; 1] = ["--no-audio"];
    let mut out = Vec::new();
    let mut skip_next = false;
    for a in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if a.starts_with("--") {
            skip_next = !VALUELESS.contains(&a.as_str());
            continue;
        }
        out.push(a.as_str());
    }
    out
}

fn build_client(args: &[String]) -> anyhow::Result<VideoClient> {
    let builder = match flag_value(args, "--config") {
        Some(path) => VideoClientBuilder::from_yaml_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => VideoClientBuilder::from_env(),
    };
    Ok(builder.build()?)
}

fn parse_request(args: &[String]) -> anyhow::Result<GenerationRequest> {
    let prompt = flag_value(args, "--prompt").ok_or_else(|| anyhow!("--prompt is required"))?;
    let mut request = GenerationRequest::new(prompt);

    if let Some(video) = flag_value(args, "--video") {
        request = request.with_reference_video(video);
    }
    for image in flag_values(args, "--image") {
        request = request.with_reference_image(image);
    }
    if let Some(mode) = flag_value(args, "--mode") {
        let mode: GenerationMode = mode.parse().map_err(|e| anyhow!("{e}"))?;
        request = request.with_mode(mode);
    }
    if let Some(d) = flag_value(args, "--duration") {
        let secs: u32 = d
            .parse()
            .with_context(|| format!("--duration expects seconds, got {d}"))?;
        request = request.with_duration(secs);
    }
    if let Some(n) = flag_value(args, "--negative") {
        request = request.with_negative_prompt(n);
    }
    if let Some(a) = flag_value(args, "--aspect") {
        request = request.with_aspect_ratio(a);
    }
    if let Some(m) = flag_value(args, "--model") {
        request = request.with_model(m);
    }
    if args.iter().any(|a| a == "--no-audio") {
        request = request.keep_audio(false);
    }
    Ok(request)
}

async fn cmd_submit(args: &[String]) -> anyhow::Result<bool> {
    let client = build_client(args)?;
    let request = parse_request(args)?;
    let job = client.submit(&request).await?;
    println!("{}", job.job_id());
    Ok(true)
}

async fn cmd_status(args: &[String]) -> anyhow::Result<bool> {
    let job_id = positionals(args)
        .first()
        .copied()
        .ok_or_else(|| anyhow!("status requires a job id"))?;
    let client = build_client(args)?;
    let status = client.poll(&GenerationJob::new(job_id)).await?;

    println!("job:      {job_id}");
    println!("state:    {}", status.state);
    if let Some(p) = status.percent {
        println!("progress: {p}%");
    }
    println!("message:  {}", status.message);
    if let Some(url) = &status.video_url {
        println!("video:    {url}");
    }
    Ok(true)
}

async fn cmd_run(args: &[String]) -> anyhow::Result<bool> {
    let client = build_client(args)?;
    let request = parse_request(args)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, cancelling...");
            on_interrupt.cancel();
        }
    });

    let on_progress = |event: &ProgressEvent| match event.percent {
        Some(p) => eprintln!("[{}] {:>3}% {}", event.state, p, event.message),
        None => eprintln!("[{}]      {}", event.state, event.message),
    };

    let result = client.run_with_cancel(&request, &on_progress, cancel).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let (Some(url), Some(out)) = (&result.video_url, flag_value(args, "--output")) {
        let written = client
            .download_artifact_to(url, PathBuf::from(out))
            .await
            .with_context(|| format!("downloading {url}"))?;
        eprintln!("saved {written} bytes to {out}");
    }
    Ok(result.success)
}

async fn cmd_download(args: &[String]) -> anyhow::Result<bool> {
    let pos = positionals(args);
    let (url, path) = match pos.as_slice() {
        [url, path, ..] => (*url, *path),
        _ => bail!("download requires <url> <path>"),
    };
    let client = build_client(args)?;
    let written = tokio::time::timeout(
        client.config().http_timeout.saturating_mul(4),
        client.download_artifact_to(url, path),
    )
    .await
    .map_err(|_| anyhow!("download timed out"))??;
    println!("{written} bytes written to {path}");
    Ok(true)
}
