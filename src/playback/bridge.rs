use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{decoder_args, renderer_args};
use crate::config::PlaybackConfig;
use crate::depacketize::AccessUnit;
use crate::error::{AppError, Result};
use crate::webrtc::VideoCodec;

/// How long `close` waits for each process before killing it
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

struct PipelineProcess {
    name: String,
    child: Child,
}

/// Owns the decode/render processes of one track
///
/// Writers are serialized by the stdin lock. Processes are killed if the
/// bridge is dropped without `close`.
pub struct PlaybackBridge {
    codec: VideoCodec,
    stdin: Mutex<Option<ChildStdin>>,
    processes: Mutex<Vec<PipelineProcess>>,
}

impl PlaybackBridge {
    /// Launch the pipeline for a codec
    pub fn start(codec: VideoCodec, config: &PlaybackConfig) -> Result<Self> {
        match config.sink_command.as_deref() {
            Some([program, args @ ..]) => {
                let mut sink = Command::new(program);
                sink.args(args);
                Self::spawn_pipeline(codec, sink, None)
            }
            Some([]) => Err(AppError::PlaybackStart("Sink command is empty".to_string())),
            None => {
                let mut decoder = Command::new(&config.ffmpeg_path);
                decoder.args(decoder_args(codec, config));
                let mut renderer = Command::new(&config.ffplay_path);
                renderer.args(renderer_args(config));
                Self::spawn_pipeline(codec, decoder, Some(renderer))
            }
        }
    }

    /// Spawn `decoder`, optionally piping its stdout into `renderer`
    fn spawn_pipeline(
        codec: VideoCodec,
        mut decoder: Command,
        renderer: Option<Command>,
    ) -> Result<Self> {
        let decoder_name = program_name(&decoder);
        decoder
            .stdin(Stdio::piped())
            .stdout(if renderer.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut decoder_child = decoder.spawn().map_err(|e| {
            AppError::PlaybackStart(format!("Failed to start {}: {}", decoder_name, e))
        })?;
        info!(
            "Started {} for {} (PID {:?})",
            decoder_name,
            codec,
            decoder_child.id()
        );

        let stdin = decoder_child
            .stdin
            .take()
            .ok_or_else(|| AppError::PlaybackStart(format!("{} has no stdin", decoder_name)))?;

        let mut processes = Vec::with_capacity(2);

        if let Some(mut renderer) = renderer {
            let renderer_name = program_name(&renderer);
            let frames = decoder_child
                .stdout
                .take()
                .ok_or_else(|| AppError::PlaybackStart(format!("{} has no stdout", decoder_name)))?;
            let frames: Stdio = frames.try_into().map_err(|e: std::io::Error| {
                AppError::PlaybackStart(format!("Failed to pipe {} output: {}", decoder_name, e))
            })?;

            renderer
                .stdin(frames)
                .stdout(Stdio::null())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);

            // decoder_child is dropped (and killed) on failure
            let renderer_child = renderer.spawn().map_err(|e| {
                AppError::PlaybackStart(format!("Failed to start {}: {}", renderer_name, e))
            })?;
            info!("Started {} (PID {:?})", renderer_name, renderer_child.id());

            processes.push(PipelineProcess {
                name: decoder_name,
                child: decoder_child,
            });
            processes.push(PipelineProcess {
                name: renderer_name,
                child: renderer_child,
            });
        } else {
            processes.push(PipelineProcess {
                name: decoder_name,
                child: decoder_child,
            });
        }

        Ok(Self {
            codec,
            stdin: Mutex::new(Some(stdin)),
            processes: Mutex::new(processes),
        })
    }

    pub fn codec(&self) -> VideoCodec {
        self.codec
    }

    /// Write one access unit, start code included
    pub async fn write(&self, unit: &AccessUnit) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            AppError::PlaybackWrite(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "playback pipe closed",
            ))
        })?;
        stdin
            .write_all(unit.as_bytes())
            .await
            .map_err(AppError::PlaybackWrite)
    }

    /// Close the input pipe and wait for the pipeline to exit
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        // EOF lets the decoder drain and exit
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Err(e) = stdin.shutdown().await {
                debug!("Closing playback pipe: {}", e);
            }
        }

        let processes: Vec<PipelineProcess> = self.processes.lock().await.drain(..).collect();
        for mut process in processes {
            match tokio::time::timeout(CLOSE_TIMEOUT, process.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("{} exited with {}", process.name, status);
                }
                Ok(Err(e)) => {
                    warn!("Failed to wait for {}: {}", process.name, e);
                }
                Err(_) => {
                    warn!(
                        "{} did not exit within {:?}, killing",
                        process.name, CLOSE_TIMEOUT
                    );
                    if let Err(e) = process.child.kill().await {
                        warn!("Failed to kill {}: {}", process.name, e);
                    }
                }
            }
        }
    }
}

fn program_name(command: &Command) -> String {
    command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned()
}
