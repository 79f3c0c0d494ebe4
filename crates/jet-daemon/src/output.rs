//! Media output seam.
//!
//! The playback session drives a [`MediaOutput`] trait object so tests can
//! substitute a scripted fake. The real implementation shells out to mpv
//! over its JSON IPC socket (Unix only): one request/response connection,
//! unsolicited events are skipped while waiting for a reply.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// One observation of the output's transport state.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputPoll {
    pub position_secs: Option<f64>,
    pub duration_secs: Option<f64>,
    /// True once the loaded source played to its natural end.
    pub eof: bool,
}

#[async_trait]
pub trait MediaOutput: Send {
    async fn load(&mut self, url: &str) -> anyhow::Result<()>;
    async fn set_pause(&mut self, paused: bool) -> anyhow::Result<()>;
    async fn stop(&mut self);
    async fn seek_to(&mut self, secs: f64) -> anyhow::Result<()>;
    async fn set_volume(&mut self, volume: f32) -> anyhow::Result<()>;
    async fn set_speed(&mut self, speed: f32) -> anyhow::Result<()>;
    async fn poll(&mut self) -> OutputPoll;
}

/// Output that swallows everything. Used on platforms without an mpv
/// driver and in setups that only exercise the metadata/library surface.
#[derive(Debug, Default)]
pub struct NullOutput;

#[async_trait]
impl MediaOutput for NullOutput {
    async fn load(&mut self, url: &str) -> anyhow::Result<()> {
        info!("output(null): load {}", url);
        Ok(())
    }

    async fn set_pause(&mut self, _paused: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&mut self) {}

    async fn seek_to(&mut self, _secs: f64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_volume(&mut self, _volume: f32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_speed(&mut self, _speed: f32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn poll(&mut self) -> OutputPoll {
        OutputPoll::default()
    }
}

#[cfg(unix)]
pub use mpv::MpvOutput;

#[cfg(unix)]
mod mpv {
    use super::*;
    use std::path::PathBuf;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::UnixStream;

    const IPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

    /// mpv child process plus its IPC connection. Spawned lazily on the
    /// first `load` and respawned if the process dies.
    pub struct MpvOutput {
        socket_path: PathBuf,
        process: Option<tokio::process::Child>,
        reader: Option<BufReader<OwnedReadHalf>>,
        writer: Option<OwnedWriteHalf>,
        next_req_id: u64,
    }

    impl MpvOutput {
        pub fn new() -> Self {
            Self {
                socket_path: jet_core::platform::mpv_socket_path(),
                process: None,
                reader: None,
                writer: None,
                next_req_id: 1,
            }
        }

        fn process_alive(&mut self) -> bool {
            match self.process {
                Some(ref mut child) => child.try_wait().ok().flatten().is_none(),
                None => false,
            }
        }

        async fn ensure_running(&mut self) -> anyhow::Result<()> {
            if self.process_alive() && self.writer.is_some() {
                return Ok(());
            }

            if let Some(mut stale) = self.process.take() {
                let _ = stale.kill().await;
            }
            self.reader = None;
            self.writer = None;
            let _ = tokio::fs::remove_file(&self.socket_path).await;

            let binary = jet_core::platform::find_mpv_binary()
                .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
            info!("output(mpv): spawning {}", binary.display());

            let child = tokio::process::Command::new(binary)
                .arg("--no-video")
                .arg("--idle=yes")
                .arg("--quiet")
                .arg(format!(
                    "--input-ipc-server={}",
                    self.socket_path.display()
                ))
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .spawn()?;
            self.process = Some(child);

            // Wait for the IPC socket to appear.
            for _ in 0..50 {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                if self.socket_path.exists() {
                    break;
                }
            }
            if !self.socket_path.exists() {
                anyhow::bail!("mpv IPC socket did not appear");
            }

            let stream = UnixStream::connect(&self.socket_path).await?;
            let (read_half, write_half) = stream.into_split();
            self.reader = Some(BufReader::new(read_half));
            self.writer = Some(write_half);
            info!("output(mpv): connected to IPC socket");
            Ok(())
        }

        /// Send one command and wait for its matching response line,
        /// skipping unsolicited event lines in between.
        async fn send(&mut self, command: Value) -> anyhow::Result<Value> {
            let req_id = self.next_req_id;
            self.next_req_id += 1;

            let mut payload =
                serde_json::to_string(&json!({ "command": command, "request_id": req_id }))?;
            payload.push('\n');

            let writer = self
                .writer
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("mpv IPC not connected"))?;
            writer.write_all(payload.as_bytes()).await?;

            let reader = self
                .reader
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("mpv IPC not connected"))?;

            tokio::time::timeout(IPC_TIMEOUT, async {
                let mut line = String::new();
                loop {
                    line.clear();
                    let n = reader.read_line(&mut line).await?;
                    if n == 0 {
                        anyhow::bail!("mpv IPC connection closed");
                    }
                    let val: Value = match serde_json::from_str(line.trim()) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if val.get("request_id").and_then(Value::as_u64) != Some(req_id) {
                        // Event or response to an abandoned request.
                        debug!("output(mpv): skipping {}", line.trim());
                        continue;
                    }
                    if val["error"].as_str() == Some("success") {
                        return Ok(val);
                    }
                    let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                    anyhow::bail!("mpv error: {}", err);
                }
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
        }

        async fn get_property_f64(&mut self, name: &str) -> Option<f64> {
            match self.send(json!(["get_property", name])).await {
                Ok(resp) => resp["data"].as_f64(),
                Err(_) => None,
            }
        }

        async fn get_property_bool(&mut self, name: &str) -> Option<bool> {
            match self.send(json!(["get_property", name])).await {
                Ok(resp) => resp["data"].as_bool(),
                Err(_) => None,
            }
        }
    }

    #[async_trait]
    impl MediaOutput for MpvOutput {
        async fn load(&mut self, url: &str) -> anyhow::Result<()> {
            self.ensure_running().await?;
            self.send(json!(["loadfile", url])).await?;
            Ok(())
        }

        async fn set_pause(&mut self, paused: bool) -> anyhow::Result<()> {
            self.send(json!(["set_property", "pause", paused])).await?;
            Ok(())
        }

        async fn stop(&mut self) {
            if let Err(e) = self.send(json!(["stop"])).await {
                warn!("output(mpv): stop failed: {}", e);
            }
        }

        async fn seek_to(&mut self, secs: f64) -> anyhow::Result<()> {
            self.send(json!(["set_property", "time-pos", secs])).await?;
            Ok(())
        }

        async fn set_volume(&mut self, volume: f32) -> anyhow::Result<()> {
            let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
            self.send(json!(["set_property", "volume", vol_pct])).await?;
            Ok(())
        }

        async fn set_speed(&mut self, speed: f32) -> anyhow::Result<()> {
            self.send(json!(["set_property", "speed", speed])).await?;
            Ok(())
        }

        async fn poll(&mut self) -> OutputPoll {
            if self.writer.is_none() {
                return OutputPoll::default();
            }
            OutputPoll {
                position_secs: self.get_property_f64("time-pos").await,
                duration_secs: self.get_property_f64("duration").await,
                eof: self.get_property_bool("eof-reached").await.unwrap_or(false),
            }
        }
    }
}
