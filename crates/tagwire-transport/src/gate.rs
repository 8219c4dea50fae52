//! Write flow-control for send batches.
//!
//! The gate tracks the current batch and how many of its frames the
//! connection has not yet acknowledged; it is writable once that count is
//! zero. It never queues:
//! the owner checks [`BackpressureGate::is_writable`] before sending and
//! waits for `on_drain` otherwise.
//!
//! Acknowledgements may complete on a connection's I/O thread, so the state
//! is kept in atomics. Batches themselves are issued serially by the owner.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::traits::TransportHandler;

/// Current batch id (high half) and its unacknowledged frames (low half),
/// updated together so an ack can never match one batch and count down
/// another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Flight {
    batch: u32,
    outstanding: u32,
}

impl Flight {
    fn unpack(raw: u64) -> Self {
        Self {
            batch: (raw >> 32) as u32,
            outstanding: raw as u32,
        }
    }

    fn pack(self) -> u64 {
        (u64::from(self.batch) << 32) | u64::from(self.outstanding)
    }
}

struct GateState {
    closed: AtomicBool,
    flight: AtomicU64,
    listener: Arc<dyn TransportHandler>,
}

/// Backpressure gate shared between a transport and its write acks.
///
/// Cloning yields a handle to the same gate.
#[derive(Clone)]
pub struct BackpressureGate {
    state: Arc<GateState>,
}

impl BackpressureGate {
    /// Create a writable gate that reports drains to `listener`.
    pub fn new(listener: Arc<dyn TransportHandler>) -> Self {
        Self {
            state: Arc::new(GateState {
                closed: AtomicBool::new(false),
                flight: AtomicU64::new(0),
                listener,
            }),
        }
    }

    /// True when no batch is in flight.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.outstanding() == 0
    }

    /// Number of frames of the current batch not yet acknowledged.
    #[inline]
    pub fn outstanding(&self) -> usize {
        Flight::unpack(self.state.flight.load(Ordering::Acquire)).outstanding as usize
    }

    /// Start a batch of `frames` writes and return its id.
    ///
    /// Supersedes any batch still in flight. An empty batch drains
    /// immediately.
    pub fn begin_send(&self, frames: usize) -> u32 {
        let outstanding = u32::try_from(frames).unwrap_or(u32::MAX);
        let mut next = Flight {
            batch: 0,
            outstanding,
        };
        // The new id and count land in one step; acks of the previous batch
        // fail the id check from here on.
        let _ = self
            .state
            .flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                next.batch = Flight::unpack(raw).batch.wrapping_add(1);
                Some(next.pack())
            });
        if frames == 0 {
            self.drain(next.batch);
        }
        next.batch
    }

    /// Acknowledgement handle for one frame of `batch`.
    pub fn ack(&self, batch: u32) -> WriteAck {
        WriteAck {
            gate: self.clone(),
            batch,
        }
    }

    /// Stop emitting drains; late acknowledgements become no-ops.
    pub fn shut(&self) {
        self.state.closed.store(true, Ordering::Release);
    }

    fn complete(&self, batch: u32) {
        let state = &self.state;
        if state.closed.load(Ordering::Acquire) {
            trace!(batch, "ack after close ignored");
            return;
        }

        let prev = state
            .flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let flight = Flight::unpack(raw);
                if flight.batch != batch || flight.outstanding == 0 {
                    return None;
                }
                Some(
                    Flight {
                        outstanding: flight.outstanding - 1,
                        ..flight
                    }
                    .pack(),
                )
            });

        match prev.map(Flight::unpack) {
            Ok(flight) if flight.outstanding == 1 => self.drain(batch),
            Ok(_) => {}
            Err(raw) if Flight::unpack(raw).batch != batch => {
                trace!(batch, "stale ack ignored");
            }
            Err(_) => trace!(batch, "extra ack ignored"),
        }
    }

    fn drain(&self, batch: u32) {
        trace!(batch, "batch drained");
        self.state.listener.on_drain();
    }
}

impl std::fmt::Debug for BackpressureGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressureGate")
            .field("writable", &self.is_writable())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Completion handle for one written frame.
///
/// Completing consumes the handle, so a frame is acknowledged at most once.
/// Dropping it without completing leaves the batch in flight.
#[derive(Debug)]
pub struct WriteAck {
    gate: BackpressureGate,
    batch: u32,
}

impl WriteAck {
    /// Report that the frame has been written.
    pub fn complete(self) {
        self.gate.complete(self.batch);
    }

    /// The batch this frame belongs to.
    pub fn batch(&self) -> u32 {
        self.batch
    }
}
