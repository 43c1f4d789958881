use crate::{IpcMessage, IpcResponse};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use supctl_core::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::debug;

/// Frames larger than this are treated as a protocol violation rather than
/// an allocation request.
const MAX_FRAME: u32 = 16 * 1024 * 1024;

async fn send_frame<T: Serialize>(stream: &mut UnixStream, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    stream.write_u32(data.len() as u32).await?;
    stream.write_all(&data).await?;
    stream.flush().await?;
    Ok(())
}

async fn recv_frame<T: DeserializeOwned>(stream: &mut UnixStream) -> Result<T> {
    let len = stream.read_u32().await?;
    if len > MAX_FRAME {
        return Err(Error::Validation(format!("ipc frame of {len} bytes refused")));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

/// One accepted or dialed control connection. Either side can keep it open
/// for multiple request/response exchanges.
pub struct IpcConnection {
    stream: UnixStream,
}

impl IpcConnection {
    pub async fn send_message(&mut self, msg: &IpcMessage) -> Result<()> {
        send_frame(&mut self.stream, msg).await
    }

    pub async fn recv_message(&mut self) -> Result<IpcMessage> {
        recv_frame(&mut self.stream).await
    }

    pub async fn send_response(&mut self, response: &IpcResponse) -> Result<()> {
        send_frame(&mut self.stream, response).await
    }

    pub async fn recv_response(&mut self) -> Result<IpcResponse> {
        recv_frame(&mut self.stream).await
    }

    /// Client-side convenience: one full exchange.
    pub async fn request(&mut self, msg: &IpcMessage) -> Result<IpcResponse> {
        self.send_message(msg).await?;
        self.recv_response().await
    }
}

pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Bind the control socket, replacing any stale file left by a previous
    /// daemon.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        debug!(path = %path.display(), "control socket bound");
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn accept(&self) -> Result<IpcConnection> {
        let (stream, _) = self.listener.accept().await?;
        Ok(IpcConnection { stream })
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct IpcClient;

impl IpcClient {
    pub async fn connect(path: impl AsRef<Path>) -> Result<IpcConnection> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(IpcConnection { stream })
    }
}
