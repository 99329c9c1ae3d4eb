use std::collections::VecDeque;

use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use log::LevelFilter;
use log::info;
use log::warn;

use xgmac::FrameError;
use xgmac::HEADER_BYTES;
use xgmac::MAX_PAYLOAD_SIZE;
use xgmac::MacHeader;
use xgmac::RxMac;
use xgmac::Scrambler;
use xgmac::StreamBeat;
use xgmac::TxMac;
use xgmac::XgmiiBeat;
use xgmac::fcs_ok;

#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Number of frames to push through the loop
    #[arg(short = 'n', long, default_value_t = 8)]
    frames: usize,
    /// Payload bytes per frame
    #[arg(short, long, default_value_t = 256)]
    payload: usize,
    /// Destination MAC address
    #[arg(long, default_value = "00:11:22:33:44:55", value_parser = mac_parser)]
    dst: [u8; 6],
    /// Source MAC address
    #[arg(long, default_value = "aa:bb:cc:dd:ee:ff", value_parser = mac_parser)]
    src: [u8; 6],
    /// EtherType, hex
    #[arg(long, default_value = "0800", value_parser = ethertype_parser)]
    ethertype: u16,
    /// Start-of-frame search window in cycles
    #[arg(short, long, default_value_t = 1000)]
    window: usize,
    /// Bypass the scrambler stage
    #[arg(long)]
    no_scramble: bool,
}

fn mac_parser(s: &str) -> Result<[u8; 6], String> {
    let mut mac = [0u8; 6];
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != mac.len() {
        return Err(format!("`{s}` is not a MAC address"));
    }
    for (byte, part) in mac.iter_mut().zip(parts) {
        *byte = u8::from_str_radix(part, 16).map_err(|_| format!("`{s}` is not a MAC address"))?;
    }
    Ok(mac)
}

fn ethertype_parser(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|_| format!("`{s}` is not a hex EtherType"))
}

/// Run two consecutive symbol beats through scramble → descramble as one
/// 64-bit word. The control mask rides alongside unscrambled; block coding
/// of the control plane sits below this model.
fn through_line(
    scr: &mut Scrambler,
    descr: &mut Scrambler,
    lo: XgmiiBeat,
    hi: XgmiiBeat,
) -> [XgmiiBeat; 2] {
    let mut word = [0u8; 8];
    word[..4].copy_from_slice(&lo.data);
    word[4..].copy_from_slice(&hi.data);
    let scrambled = scr.scramble(u64::from_le_bytes(word));
    let clear = descr.descramble(scrambled).to_le_bytes();
    [
        XgmiiBeat {
            data: clear[..4].try_into().unwrap(),
            ctl: lo.ctl,
        },
        XgmiiBeat {
            data: clear[4..].try_into().unwrap(),
            ctl: hi.ctl,
        },
    ]
}

fn main() -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter(None, LevelFilter::Info).init();

    let args = Args::parse();
    if args.payload > MAX_PAYLOAD_SIZE {
        bail!(
            "payload length {} exceeds the {} byte maximum",
            args.payload,
            MAX_PAYLOAD_SIZE
        );
    }

    let header = MacHeader {
        dst: args.dst,
        src: args.src,
        ethertype: args.ethertype,
    };

    let mut tx = TxMac::new(header);
    let mut rx = RxMac::new(args.window);
    let mut scr = Scrambler::new();
    let mut descr = Scrambler::new();

    let payloads: Vec<Vec<u8>> = (0..args.frames)
        .map(|n| (0..args.payload).map(|i| (i + n) as u8).collect())
        .collect();
    let mut input: VecDeque<StreamBeat> = payloads
        .iter()
        .flat_map(|p| StreamBeat::split(p))
        .collect();

    let mut transfers: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut statuses: Vec<Result<usize, FrameError>> = Vec::new();
    let mut half: Option<XgmiiBeat> = None;
    let mut cycles = 0u64;
    let budget = (args.frames * (args.payload / 4 + 200) + 1000) as u64;

    while transfers.len() < args.frames {
        cycles += 1;
        if cycles > budget {
            bail!("loopback made no progress after {} cycles", cycles);
        }

        let tick = tx.tick(input.front(), true);
        if tick.consumed {
            input.pop_front();
        }
        let Some(beat) = tick.beat else { continue };

        let line: Vec<XgmiiBeat> = if args.no_scramble {
            vec![beat]
        } else {
            match half.take() {
                None => {
                    half = Some(beat);
                    continue;
                }
                Some(lo) => through_line(&mut scr, &mut descr, lo, beat).to_vec(),
            }
        };

        for beat in line {
            let tick = rx.tick(&beat, true);
            if let Some(out) = tick.beat {
                current.extend_from_slice(out.bytes());
                if out.last {
                    transfers.push(std::mem::take(&mut current));
                }
            }
            if let Some(status) = tick.frame {
                if let Err(e) = status {
                    warn!("loopback: receive reported {e}");
                }
                statuses.push(status);
            }
        }
    }

    let mut bad = 0usize;
    for (n, (payload, frame)) in payloads.iter().zip(&transfers).enumerate() {
        let status = statuses.get(n).copied().unwrap_or(Err(FrameError::NoFrame(0)));
        let intact = status == Ok(frame.len())
            && fcs_ok(frame)
            && frame[..HEADER_BYTES] == header.bytes()
            && frame[HEADER_BYTES..HEADER_BYTES + payload.len()] == payload[..];
        if intact {
            info!("frame {n}: {} wire bytes, FCS ok", frame.len());
        } else {
            warn!("frame {n}: corrupted ({status:?}, {} wire bytes)", frame.len());
            bad += 1;
        }
    }

    println!(
        "{} of {} frames round-tripped intact over {} cycles{}",
        args.frames - bad,
        args.frames,
        cycles,
        if args.no_scramble {
            ""
        } else {
            " (scrambled line)"
        }
    );
    if bad > 0 {
        bail!("{bad} frames corrupted");
    }
    Ok(())
}
