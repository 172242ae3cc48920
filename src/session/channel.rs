use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{ObjectHandle, Orientation, SimulatorSession};
use crate::error::SessionError;

// ============================================================================
// WIRE MESSAGES - session <-> simulator thread
// ============================================================================

#[derive(Clone, Debug)]
pub enum Request {
    ResolveHandle(String),
    StartEpisode,
    StopEpisode,
    ReadOrientation(ObjectHandle),
    SetMotorVelocity(ObjectHandle, f64),
    TriggerStep,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Handle(ObjectHandle),
    Orientation(Orientation),
    Done,
}

#[derive(Clone, Debug)]
pub struct Envelope {
    pub seq: u64,
    pub request: Request,
}

#[derive(Clone, Debug)]
pub struct Reply {
    pub seq: u64,
    pub result: Result<Response, SessionError>,
}

// ============================================================================
// SIM CHANNELS - both directions of one session link
// ============================================================================

#[derive(Clone)]
pub struct SimChannels {
    // Session -> Simulator
    pub request_tx: Sender<Envelope>,
    pub request_rx: Arc<Receiver<Envelope>>,

    // Simulator -> Session
    pub reply_tx: Sender<Reply>,
    pub reply_rx: Arc<Receiver<Reply>>,
}

impl SimChannels {
    pub fn new(buffer_size: usize) -> Self {
        let (request_tx, request_rx) = bounded(buffer_size);
        let (reply_tx, reply_rx) = bounded(buffer_size);

        Self {
            request_tx,
            request_rx: Arc::new(request_rx),
            reply_tx,
            reply_rx: Arc::new(reply_rx),
        }
    }
}

// ============================================================================
// CHANNEL SESSION - SimulatorSession over crossbeam with bounded waits
// ============================================================================

pub struct ChannelSession {
    request_tx: Sender<Envelope>,
    reply_rx: Arc<Receiver<Reply>>,
    timeout: Duration,
    next_seq: u64,
}

impl ChannelSession {
    pub fn connect(channels: &SimChannels, timeout: Duration) -> Self {
        Self {
            request_tx: channels.request_tx.clone(),
            reply_rx: channels.reply_rx.clone(),
            timeout,
            next_seq: 0,
        }
    }

    fn timeout_error(&self) -> SessionError {
        SessionError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    fn call(&mut self, request: Request) -> Result<Response, SessionError> {
        self.next_seq += 1;
        let seq = self.next_seq;
        let deadline = Instant::now() + self.timeout;

        trace!(seq, ?request, "session request");
        match self.request_tx.send_timeout(Envelope { seq, request }, self.timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(self.timeout_error()),
            Err(SendTimeoutError::Disconnected(_)) => return Err(SessionError::Disconnected),
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.reply_rx.recv_timeout(remaining) {
                Ok(reply) if reply.seq == seq => return reply.result,
                Ok(stale) => {
                    // Answer to a call that already timed out
                    debug!(seq = stale.seq, expected = seq, "dropping stale simulator reply");
                }
                Err(RecvTimeoutError::Timeout) => return Err(self.timeout_error()),
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::Disconnected),
            }
        }
    }

    fn expect_done(response: Response) -> Result<(), SessionError> {
        match response {
            Response::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> SessionError {
    SessionError::Remote {
        code: -1,
        message: format!("unexpected response {:?}", response),
    }
}

impl SimulatorSession for ChannelSession {
    fn resolve_handle(&mut self, name: &str) -> Result<ObjectHandle, SessionError> {
        match self.call(Request::ResolveHandle(name.to_string()))? {
            Response::Handle(handle) => Ok(handle),
            other => Err(unexpected(other)),
        }
    }

    fn start_episode(&mut self) -> Result<(), SessionError> {
        Self::expect_done(self.call(Request::StartEpisode)?)
    }

    fn stop_episode(&mut self) -> Result<(), SessionError> {
        Self::expect_done(self.call(Request::StopEpisode)?)
    }

    fn read_orientation(&mut self, body: ObjectHandle) -> Result<Orientation, SessionError> {
        match self.call(Request::ReadOrientation(body))? {
            Response::Orientation(o) => Ok(o),
            other => Err(unexpected(other)),
        }
    }

    fn set_motor_velocity(
        &mut self,
        motor: ObjectHandle,
        velocity: f64,
    ) -> Result<(), SessionError> {
        Self::expect_done(self.call(Request::SetMotorVelocity(motor, velocity))?)
    }

    fn trigger_step(&mut self) -> Result<(), SessionError> {
        Self::expect_done(self.call(Request::TriggerStep)?)
    }
}
