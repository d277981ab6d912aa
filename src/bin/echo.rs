use std::{collections::HashMap, io, net::SocketAddr};

use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use clap::Parser;
use hybi_frames::{DecoderConfig, FrameStream, MAX_FRAME_PAYLOAD, MAX_MESSAGE_SIZE, Opcode, Role};
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing_subscriber::EnvFilter;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(Parser)]
#[command(author, version, about = "Echo server for the hybi-frames decoder")]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    addr: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8765)]
    port: u16,

    /// Accept unmasked frames from clients
    #[arg(long)]
    allow_unmasked: bool,

    /// Largest frame payload to accept, in bytes
    #[arg(long, default_value_t = MAX_FRAME_PAYLOAD)]
    max_frame_size: usize,

    /// Largest reassembled message to accept, in bytes
    #[arg(long, default_value_t = MAX_MESSAGE_SIZE)]
    max_message_size: usize,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hybi_frames=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let config = DecoderConfig {
        role: Role::Server,
        require_masked_client_frames: !args.allow_unmasked,
        max_frame_size: args.max_frame_size,
        max_message_size: args.max_message_size,
    };

    let listener = TcpListener::bind((args.addr.as_str(), args.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = serve(stream, peer, config).await {
                tracing::warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

async fn serve(stream: TcpStream, peer: SocketAddr, config: DecoderConfig) -> io::Result<()> {
    let stream = upgrade(stream).await?;
    tracing::info!(%peer, "client connected");

    let mut ws = FrameStream::new(stream, config);
    loop {
        match ws.next_frame().await {
            Ok(Some(frame)) => {
                if matches!(frame.opcode(), Opcode::Text | Opcode::Bin) {
                    tracing::info!(%peer, opcode = ?frame.opcode(), len = frame.payload().len(), "echo");
                    ws.send(&frame).await?;
                }
            }
            Ok(None) => {
                tracing::info!(%peer, "client closed");
                return Ok(());
            }
            Err(e) => return Err(io::Error::other(e)),
        }
    }
}

// Minimal server side of the opening handshake. The reader is kept since it may
// already hold the first frames.
async fn upgrade(stream: TcpStream) -> io::Result<BufReader<TcpStream>> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    if !request_line.starts_with("GET ") {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected GET request"));
    }

    // collect headers in a hashmap
    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let key = headers
        .get("sec-websocket-key")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Sec-WebSocket-Key"))?;

    let accept = {
        let mut sha = Sha1::new();
        sha.update(key.as_bytes());
        sha.update(WS_GUID.as_bytes());
        BASE64.encode(sha.finalize())
    };

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n",
    );

    reader.get_mut().write_all(response.as_bytes()).await?;
    Ok(reader)
}
