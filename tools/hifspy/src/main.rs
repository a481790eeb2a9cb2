use std::fs::File;
use std::io::{self, Read};
use std::net::UdpSocket;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use hifspy::{PacketFormatter, StreamDecoder};

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode sensor hub host-interface packet streams")]
struct Opts {
    /// Listen for captured Get-Data payloads on this address
    #[arg(long = "udp", default_value = "0.0.0.0:7702", value_name = "ADDR")]
    udp_addr: String,

    /// Decode a capture file instead of listening
    #[arg(long = "file", value_name = "PATH")]
    file: Option<PathBuf>,

    /// Print one JSON object per packet
    #[arg(long)]
    json: bool,

    #[arg(long = "no-timestamps")]
    no_timestamps: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let formatter = PacketFormatter::new(!opts.no_timestamps, opts.json);
    let mut decoder = StreamDecoder::new();

    match &opts.file {
        Some(path) => decode_file(path, &mut decoder, &formatter)?,
        None => listen(&opts.udp_addr, &mut decoder, &formatter)?,
    }

    let stats = decoder.stats();
    eprintln!(
        "{} packets, {} crc errors, {} bytes skipped",
        stats.packets, stats.crc_errors, stats.skipped_bytes
    );
    Ok(())
}

fn decode_chunk(decoder: &mut StreamDecoder, formatter: &PacketFormatter, chunk: &[u8]) {
    for result in decoder.push_bytes(chunk) {
        match result {
            Ok(packet) => formatter.print_packet(&packet),
            Err(err) => eprintln!("{}", err.to_string().yellow()),
        }
    }
}

fn decode_file(path: &PathBuf, decoder: &mut StreamDecoder, formatter: &PacketFormatter) -> Result<()> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = [0u8; 4096];
    loop {
        let len = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        decode_chunk(decoder, formatter, &buf[..len]);
    }
    if let Err(err) = decoder.finish() {
        eprintln!("{}", err.to_string().yellow());
    }
    Ok(())
}

fn listen(addr: &str, decoder: &mut StreamDecoder, formatter: &PacketFormatter) -> Result<()> {
    let socket = UdpSocket::bind(addr).with_context(|| format!("binding udp://{addr}"))?;
    eprintln!("hifspy listening on udp://{addr}");

    let mut buf = [0u8; 4096];
    let mut last_peer: Option<String> = None;

    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                let peer_str = peer.to_string();
                if last_peer.as_deref() != Some(peer_str.as_str()) {
                    eprintln!("packets from {peer}");
                    decoder.reset();
                }
                last_peer = Some(peer_str);
                decode_chunk(decoder, formatter, &buf[..len]);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                eprintln!("socket error: {err}");
                break;
            }
        }
    }

    Ok(())
}
