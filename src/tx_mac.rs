use std::collections::VecDeque;

use log::debug;
use log::warn;

use crate::Crc32;
use crate::HEADER_BYTES;
use crate::IFG_BYTES;
use crate::LANES;
use crate::MAX_PAYLOAD_SIZE;
use crate::MIN_PAYLOAD_SIZE;
use crate::PREAMBLE_BYTE;
use crate::SFD_BYTE;
use crate::StreamBeat;
use crate::XGMII_ERROR;
use crate::XGMII_IDLE;
use crate::XGMII_START;
use crate::XGMII_TERMINATE;
use crate::XgmiiBeat;

/// Preamble symbols on the wire: START stands in for the first preamble
/// byte, then six 0x55 fill bytes and the start-of-frame delimiter.
const PREAMBLE_SYMS: usize = 8;

/// Input beats staged ahead of the wire. Two beats of headroom keep the
/// datapath busy across the preamble without turning the MAC into a frame
/// buffer.
const STAGE_DEPTH: usize = 2 * LANES;

/// Header inserted by the transmit MAC in front of the payload stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacHeader {
    /// Destination address, wire order.
    pub dst: [u8; 6],
    /// Source address, wire order.
    pub src: [u8; 6],
    /// EtherType, sent big-endian.
    pub ethertype: u16,
}

impl MacHeader {
    /// The fourteen header bytes in wire order.
    pub fn bytes(&self) -> [u8; HEADER_BYTES] {
        let mut b = [0u8; HEADER_BYTES];
        b[0..6].copy_from_slice(&self.dst);
        b[6..12].copy_from_slice(&self.src);
        b[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxPhase {
    Idle,
    Preamble { index: usize },
    Header { index: usize },
    Payload,
    Pad { remaining: usize },
    Fcs { index: usize, fcs: [u8; 4] },
    Terminate,
    Gap { remaining: usize },
}

/// Result of one transmit clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxTick {
    /// Symbol beat put on the line this cycle, if any. `None` means the
    /// component is stalled (line not ready, or the upstream starved it
    /// mid-frame) and the stream position is held.
    pub beat: Option<XgmiiBeat>,
    /// Ready/valid handshake result: the offered input beat was accepted.
    pub consumed: bool,
}

/// Transmit MAC: frames a flow-controlled byte stream onto the 4-lane
/// symbol bus.
///
/// One `tick` per clock edge. The framer inserts the configured header,
/// streams payload beats through a bounded staging queue, zero-pads to the
/// 46-byte payload floor, appends the CRC-32 FCS least significant byte
/// first, and closes the frame with TERMINATE followed by at least twelve
/// idle bytes of inter-frame gap. The CRC register observes every emitted
/// byte of the address + type + payload (+ pad) region exactly once, across
/// any pattern of stalls.
pub struct TxMac {
    header: [u8; HEADER_BYTES],
    phase: TxPhase,
    crc: Crc32,
    staged: VecDeque<u8>,
    /// The current input transfer's last beat has been staged.
    eof: bool,
    /// Discarding the rest of an oversize input transfer.
    draining: bool,
    payload_len: usize,
}

impl TxMac {
    /// Framer in the reset state with the given header configuration.
    pub fn new(header: MacHeader) -> Self {
        Self {
            header: header.bytes(),
            phase: TxPhase::Idle,
            crc: Crc32::new(),
            staged: VecDeque::new(),
            eof: false,
            draining: false,
            payload_len: 0,
        }
    }

    /// Return to idle, dropping any frame in flight.
    pub fn reset(&mut self) {
        self.phase = TxPhase::Idle;
        self.crc.reset();
        self.staged.clear();
        self.eof = false;
        self.draining = false;
        self.payload_len = 0;
    }

    /// Advance one clock edge.
    ///
    /// `input` is the upstream beat on offer this cycle (`consumed` in the
    /// result is the ready side of the handshake). `line_ready` is the
    /// downstream readiness; while deasserted the component holds its
    /// position completely — nothing is emitted and nothing is consumed, so
    /// a mid-frame stall can never truncate the frame.
    pub fn tick(&mut self, input: Option<&StreamBeat>, line_ready: bool) -> TxTick {
        if !line_ready {
            return TxTick {
                beat: None,
                consumed: false,
            };
        }

        let consumed = self.try_consume(input);

        if self.phase == TxPhase::Idle && (!self.staged.is_empty() || self.eof) {
            debug!("TxMac: start of packet, entering preamble");
            self.phase = TxPhase::Preamble { index: 0 };
        }

        // Payload bytes this beat would need beyond what is staged. If the
        // upstream has starved us mid-frame, hold the whole beat; the CRC
        // and the wire position freeze together.
        let need = match self.phase {
            TxPhase::Header { index } => LANES.saturating_sub(HEADER_BYTES - index),
            TxPhase::Payload => LANES,
            _ => 0,
        };
        if !self.eof && need > self.staged.len() {
            return TxTick {
                beat: None,
                consumed,
            };
        }

        let mut data = [0u8; LANES];
        let mut ctl = 0u8;
        for lane in 0..LANES {
            let (byte, is_ctl) = self.next_symbol();
            data[lane] = byte;
            if is_ctl {
                ctl |= 1 << lane;
            }
        }

        TxTick {
            beat: Some(XgmiiBeat { data, ctl }),
            consumed,
        }
    }

    fn try_consume(&mut self, input: Option<&StreamBeat>) -> bool {
        let Some(beat) = input else {
            return false;
        };
        if self.draining {
            if beat.last {
                self.draining = false;
            }
            return true;
        }
        let accepting = !self.eof
            && self.staged.len() + LANES <= STAGE_DEPTH
            && matches!(
                self.phase,
                TxPhase::Idle
                    | TxPhase::Preamble { .. }
                    | TxPhase::Header { .. }
                    | TxPhase::Payload
            );
        if !accepting {
            return false;
        }
        self.staged.extend(beat.bytes());
        if beat.last {
            self.eof = true;
        }
        true
    }

    /// One lane's worth of frame progress. Loops only across transitions
    /// that emit nothing (entering the pad/FCS tail).
    fn next_symbol(&mut self) -> (u8, bool) {
        loop {
            match self.phase {
                TxPhase::Idle | TxPhase::Gap { remaining: 0 } => {
                    self.phase = TxPhase::Idle;
                    return (XGMII_IDLE, true);
                }
                TxPhase::Preamble { index } => {
                    self.phase = if index + 1 == PREAMBLE_SYMS {
                        self.crc.reset();
                        TxPhase::Header { index: 0 }
                    } else {
                        TxPhase::Preamble { index: index + 1 }
                    };
                    return match index {
                        0 => (XGMII_START, true),
                        7 => (SFD_BYTE, false),
                        _ => (PREAMBLE_BYTE, false),
                    };
                }
                TxPhase::Header { index } => {
                    let byte = self.header[index];
                    self.crc.update(byte);
                    self.phase = if index + 1 == HEADER_BYTES {
                        TxPhase::Payload
                    } else {
                        TxPhase::Header { index: index + 1 }
                    };
                    return (byte, false);
                }
                TxPhase::Payload => match self.staged.pop_front() {
                    Some(byte) => {
                        if self.payload_len == MAX_PAYLOAD_SIZE {
                            warn!(
                                "TxMac: payload exceeds {} bytes, aborting frame",
                                MAX_PAYLOAD_SIZE
                            );
                            self.staged.clear();
                            self.draining = !self.eof;
                            self.eof = false;
                            self.payload_len = 0;
                            self.phase = TxPhase::Terminate;
                            return (XGMII_ERROR, true);
                        }
                        self.crc.update(byte);
                        self.payload_len += 1;
                        return (byte, false);
                    }
                    // Staging empty with the transfer complete: enter the
                    // pad/FCS tail without emitting.
                    None => {
                        self.phase = TxPhase::Pad {
                            remaining: MIN_PAYLOAD_SIZE.saturating_sub(self.payload_len),
                        };
                    }
                },
                TxPhase::Pad { remaining: 0 } => {
                    self.phase = TxPhase::Fcs {
                        index: 0,
                        fcs: self.crc.finalize().to_le_bytes(),
                    };
                }
                TxPhase::Pad { remaining } => {
                    self.crc.update(0);
                    self.phase = TxPhase::Pad {
                        remaining: remaining - 1,
                    };
                    return (0, false);
                }
                TxPhase::Fcs { index, fcs } => {
                    self.phase = if index + 1 == fcs.len() {
                        TxPhase::Terminate
                    } else {
                        TxPhase::Fcs {
                            index: index + 1,
                            fcs,
                        }
                    };
                    return (fcs[index], false);
                }
                TxPhase::Terminate => {
                    debug!("TxMac: end of packet, {} payload bytes", self.payload_len);
                    self.eof = false;
                    self.payload_len = 0;
                    self.phase = TxPhase::Gap {
                        remaining: IFG_BYTES,
                    };
                    return (XGMII_TERMINATE, true);
                }
                TxPhase::Gap { remaining } => {
                    self.phase = TxPhase::Gap {
                        remaining: remaining - 1,
                    };
                    return (XGMII_IDLE, true);
                }
            }
        }
    }
}
