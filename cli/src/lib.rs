//! Non-interactive console for driving phone devices through the agent
//! backend: streams a task's execution trace to stdout and optionally keeps a
//! polled copy of the device screen on disk.

mod cli;
mod event_processor;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use anyhow::Context;
use phonepilot_backend_client::Client;
use phonepilot_core::Config;
use phonepilot_core::DisplayController;
use phonepilot_core::FrameSource;
use phonepilot_core::ScreenshotPoller;
use phonepilot_core::SessionController;
use phonepilot_core::SessionUpdate;
use phonepilot_core::probe_video_capability;
use phonepilot_protocol::TaskOutcome;
use phonepilot_protocol::TaskVariant;
use phonepilot_protocol::Transport;
use supports_color::Stream;
use tokio::sync::watch;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub use cli::Cli;
pub use cli::Color;
pub use cli::Command;
pub use cli::DisplayModeArg;
pub use cli::ExecArgs;
pub use cli::ScreenshotArgs;
use event_processor::EventProcessorWithHumanOutput;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let (stdout_with_ansi, stderr_with_ansi) = match cli.color {
        Color::Always => (true, true),
        Color::Never => (false, false),
        Color::Auto => (
            supports_color::on_cached(Stream::Stdout).is_some(),
            supports_color::on_cached(Stream::Stderr).is_some(),
        ),
    };

    let default_level = "error";
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(stderr_with_ansi)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();

    let mut config = match &cli.config_file {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = cli.backend_url.clone() {
        config.backend_url = url;
    }
    let client =
        Arc::new(Client::new(&config.backend_url).context("failed to build backend client")?);

    match cli.command {
        Command::Exec(args) => run_exec(args, config, client, stdout_with_ansi).await,
        Command::Screenshot(args) => run_screenshot(args, client).await,
        Command::Status => run_status(&client).await,
    }
}

async fn run_exec(
    args: ExecArgs,
    config: Config,
    client: Arc<Client>,
    stdout_with_ansi: bool,
) -> anyhow::Result<()> {
    let variant = if args.orchestrated {
        TaskVariant::Orchestrated
    } else {
        TaskVariant::Direct
    };
    let processor = EventProcessorWithHumanOutput::create_with_ansi(stdout_with_ansi);

    let capability = probe_video_capability(config.video_stream_url.as_deref());
    let mut display = DisplayController::new(&args.device, capability).with_mode(args.display.into());
    if display.should_show_advisory() && !args.json {
        processor.print_capability_advisory(capability);
        display.dismiss_advisory();
    }

    let mut controller = SessionController::new(
        client.clone(),
        &args.device,
        variant,
        config.stream_idle_timeout,
        config.thinking_flush_window,
    );

    // Frame capture runs only on the screenshot transport; the video path is
    // rendered by the companion viewer, not this console.
    let generation = Arc::new(AtomicU64::new(0));
    let (frames_tx, mut frames_rx) = watch::channel(None);
    let mut poller = None;
    let mut saving = false;
    if let Some(dir) = &args.save_frames {
        match display.effective_transport() {
            Transport::Screenshot => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                poller = Some(ScreenshotPoller::spawn(
                    client.clone(),
                    args.device.clone(),
                    config.screenshot_poll_interval,
                    frames_tx,
                    generation.clone(),
                ));
                saving = true;
            }
            Transport::Video => {
                warn!("--save-frames only applies to the screenshot transport; skipping");
            }
        }
    }

    if !args.json {
        processor.print_task_started(&args.device, &args.task, variant);
    }
    let mut updates = controller.send(args.task.clone()).await;
    let mut frame_index: u32 = 0;
    let mut outcome = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !args.json {
                    processor.print_interrupt();
                }
                controller.abort().await;
            }
            update = updates.recv() => match update {
                Some(update) => {
                    if args.json {
                        #[allow(clippy::print_stdout)]
                        {
                            println!("{}", serde_json::to_string(&update)?);
                        }
                    } else {
                        processor.process_update(&update);
                    }
                    if let SessionUpdate::Finished { outcome: finished } = update {
                        outcome = Some(finished);
                        break;
                    }
                }
                None => break,
            },
            changed = frames_rx.changed(), if saving => match changed {
                Ok(()) => {
                    let frame = frames_rx.borrow_and_update().clone();
                    if let (Some(frame), Some(dir)) = (frame, &args.save_frames) {
                        if frame.is_sensitive {
                            warn!("skipping sensitive frame");
                            continue;
                        }
                        let path = dir.join(format!("frame-{frame_index:04}.png"));
                        if let Err(err) = std::fs::write(&path, &frame.data) {
                            warn!("failed to write {}: {err}", path.display());
                        } else {
                            frame_index += 1;
                            if !args.json {
                                processor.print_frame_saved(&path);
                            }
                        }
                    }
                }
                Err(_) => {
                    saving = false;
                }
            },
        }
    }

    if let Some(poller) = poller.take() {
        poller.stopped().await;
    }
    controller.shutdown().await;

    match outcome {
        Some(TaskOutcome::Completed { success: true, .. }) | Some(TaskOutcome::Aborted { .. }) => {
            Ok(())
        }
        Some(TaskOutcome::Completed { message, .. }) | Some(TaskOutcome::Failed { message }) => {
            anyhow::bail!("task failed: {message}")
        }
        None => anyhow::bail!("stream closed without a terminal record"),
    }
}

#[allow(clippy::print_stdout)]
async fn run_screenshot(args: ScreenshotArgs, client: Arc<Client>) -> anyhow::Result<()> {
    let frame = client
        .fetch_frame(&args.device)
        .await
        .context("screenshot failed")?;
    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}-screen.png", args.device)));
    std::fs::write(&path, &frame.data)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "wrote {}x{} frame to {}",
        frame.width,
        frame.height,
        path.display()
    );
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn run_status(client: &Client) -> anyhow::Result<()> {
    client
        .health()
        .await
        .context("agent backend is unreachable")?;
    println!("agent backend reachable at {}", client.base_url());
    Ok(())
}
