use std::collections::VecDeque;

use log::debug;
use log::warn;
use thiserror::Error;

use crate::LANES;
use crate::MAX_FRAME_SIZE;
use crate::MIN_FRAME_SIZE;
use crate::PREAMBLE_BYTE;
use crate::SFD_BYTE;
use crate::StreamBeat;
use crate::XGMII_START;
use crate::XGMII_TERMINATE;
use crate::XgmiiBeat;

/// Structured receive-side frame conditions. None of these are fatal: the
/// deframer reports them by value and returns to searching for the next
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No START marker appeared within the observation window.
    #[error("no start of frame within {0} cycles")]
    NoFrame(usize),
    /// TERMINATE arrived before the minimum frame size.
    #[error("frame terminated after {0} bytes, below the 64-byte minimum")]
    Runt(usize),
    /// The frame ran past the maximum size without TERMINATE.
    #[error("frame exceeds the 1518-byte maximum")]
    Oversize,
    /// An ERROR or stray control code appeared inside the frame.
    #[error("control code inside frame")]
    Corrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Search { cycles: usize },
    Preamble,
    Payload,
}

/// Result of one receive clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxTick {
    /// Output beat presented to the sink this cycle. Only ever `Some` when
    /// the sink signalled ready — validity is never asserted into a stalled
    /// consumer.
    pub beat: Option<StreamBeat>,
    /// Frame completion status: `Ok(wire_bytes)` when a frame (addresses +
    /// type + payload + FCS) finished this cycle, `Err` for a framing
    /// condition.
    pub frame: Option<Result<usize, FrameError>>,
}

/// Receive MAC: recovers flow-controlled byte transfers from the 4-lane
/// symbol stream.
///
/// One `tick` per clock edge. The deframer scans for START, swallows the
/// preamble and SFD, then forwards every data byte — including the trailing
/// FCS, whose verification is the consumer's judgment via [`crate::fcs_ok`] —
/// until TERMINATE. The final beat of each transfer carries `last` with a
/// keep mask counting exactly the bytes that preceded TERMINATE. Decoded
/// bytes wait in an internal queue while the sink is stalled; frame
/// boundaries are tracked so beats of consecutive frames never share a
/// transfer.
pub struct RxMac {
    state: RxState,
    window: usize,
    queue: VecDeque<u8>,
    /// Absolute ingest positions where finished frames end.
    ends: VecDeque<usize>,
    pushed: usize,
    popped: usize,
    frame_len: usize,
}

impl RxMac {
    /// Deframer in the reset state. `window` bounds the start-of-frame
    /// search: after that many cycles without a START the tick reports
    /// [`FrameError::NoFrame`] instead of blocking forever.
    pub fn new(window: usize) -> Self {
        debug_assert!(window > 0);
        Self {
            state: RxState::Search { cycles: 0 },
            window,
            queue: VecDeque::new(),
            ends: VecDeque::new(),
            pushed: 0,
            popped: 0,
            frame_len: 0,
        }
    }

    /// Return to searching, dropping any frame in flight and all queued
    /// output.
    pub fn reset(&mut self) {
        self.state = RxState::Search { cycles: 0 };
        self.queue.clear();
        self.ends.clear();
        self.pushed = 0;
        self.popped = 0;
        self.frame_len = 0;
    }

    /// Advance one clock edge with the symbol beat observed on the line.
    pub fn tick(&mut self, line: &XgmiiBeat, sink_ready: bool) -> RxTick {
        let frame = self.ingest(line);
        let beat = self.emit(sink_ready);
        RxTick { beat, frame }
    }

    fn ingest(&mut self, line: &XgmiiBeat) -> Option<Result<usize, FrameError>> {
        let mut event = None;
        for lane in 0..LANES {
            let byte = line.data[lane];
            let ctl = line.is_ctl(lane);
            match self.state {
                RxState::Search { .. } => {
                    if ctl && byte == XGMII_START {
                        debug!("RxMac: START in lane {}", lane);
                        self.state = RxState::Preamble;
                    }
                }
                RxState::Preamble => {
                    if ctl || (byte != PREAMBLE_BYTE && byte != SFD_BYTE) {
                        warn!(
                            "RxMac: unexpected byte {:#04x} during preamble, resuming search",
                            byte
                        );
                        self.state = RxState::Search { cycles: 0 };
                    } else if byte == SFD_BYTE {
                        self.state = RxState::Payload;
                        self.frame_len = 0;
                    }
                }
                RxState::Payload => {
                    if ctl {
                        let status = if byte == XGMII_TERMINATE {
                            None
                        } else {
                            warn!("RxMac: control code {:#04x} inside frame", byte);
                            Some(FrameError::Corrupt)
                        };
                        event = event.or(Some(self.end_frame(status)));
                    } else if self.frame_len == MAX_FRAME_SIZE {
                        event = event.or(Some(self.end_frame(Some(FrameError::Oversize))));
                    } else {
                        self.queue.push_back(byte);
                        self.pushed += 1;
                        self.frame_len += 1;
                    }
                }
            }
        }

        if let RxState::Search { ref mut cycles } = self.state {
            *cycles += 1;
            if *cycles >= self.window {
                *cycles = 0;
                event = event.or(Some(Err(FrameError::NoFrame(self.window))));
            }
        }

        event
    }

    /// Close the current frame's transfer and go back to searching.
    fn end_frame(&mut self, error: Option<FrameError>) -> Result<usize, FrameError> {
        let len = self.frame_len;
        if len > 0 {
            self.ends.push_back(self.pushed);
        }
        self.state = RxState::Search { cycles: 0 };
        self.frame_len = 0;
        match error {
            Some(e) => Err(e),
            None if len < MIN_FRAME_SIZE => Err(FrameError::Runt(len)),
            None => {
                debug!("RxMac: frame complete, {} bytes", len);
                Ok(len)
            }
        }
    }

    fn emit(&mut self, sink_ready: bool) -> Option<StreamBeat> {
        if !sink_ready || self.queue.is_empty() {
            return None;
        }
        // Distance to the oldest frame boundary still queued, if any.
        let boundary = self.ends.front().map(|end| end - self.popped);
        let (n, last) = match boundary {
            Some(b) if b <= LANES => (b, true),
            _ => {
                if self.queue.len() <= LANES {
                    // The frame may end inside the newest beat; hold it back
                    // until TERMINATE (or more data) settles the keep mask.
                    return None;
                }
                (LANES, false)
            }
        };
        let mut data = [0u8; LANES];
        for slot in data.iter_mut().take(n) {
            *slot = self.queue.pop_front().unwrap();
        }
        self.popped += n;
        if last {
            self.ends.pop_front();
        }
        Some(StreamBeat {
            data,
            keep: (1u8 << n) - 1,
            last,
        })
    }
}
